//! Scrape orchestration.
//!
//! Every HTTP scrape runs one collection cycle against the management API
//! and renders the result together with the exporter's own `up` metrics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::client::StatsSource;
use crate::error::CollectError;
use crate::exposition::{Exposition, MetricSink};
use crate::queue::{CycleSummary, QueueCollector};
use crate::registry::{Descriptor, MetricKind};

const MODULE_LABELS: &[&str] = &["module"];

const UP: Descriptor = Descriptor {
    name: "up",
    help: "Was the last scrape of RabbitMQ successful.",
    kind: MetricKind::Gauge,
    labels: &[],
};

const MODULE_UP: Descriptor = Descriptor {
    name: "module_up",
    help: "Was the last scrape of the module successful.",
    kind: MetricKind::Gauge,
    labels: MODULE_LABELS,
};

const MODULE_SCRAPE_DURATION: Descriptor = Descriptor {
    name: "module_scrape_duration_seconds",
    help: "Duration of the last scrape of the module in seconds.",
    kind: MetricKind::Gauge,
    labels: MODULE_LABELS,
};

/// Runs collection cycles on demand.
#[derive(Debug)]
pub struct Exporter<S> {
    source: S,
    queues: QueueCollector,
    prefix: String,
    /// Serializes cycles; the long-lived gauges are shared between them.
    scrape_lock: Mutex<()>,
    last_scrape_ok: AtomicBool,
}

impl<S: StatsSource> Exporter<S> {
    /// Create an exporter; metric names get `prefix`.
    pub fn new(source: S, queues: QueueCollector, prefix: impl Into<String>) -> Self {
        Self {
            source,
            queues,
            prefix: prefix.into(),
            scrape_lock: Mutex::new(()),
            last_scrape_ok: AtomicBool::new(false),
        }
    }

    /// Whether the most recent scrape succeeded. False before the first one.
    pub fn last_scrape_ok(&self) -> bool {
        self.last_scrape_ok.load(Ordering::Relaxed)
    }

    /// Announce every exported descriptor, including the exporter's own.
    pub fn describe<K: MetricSink + ?Sized>(&self, sink: &mut K) {
        sink.describe(&UP);
        sink.describe(&MODULE_UP);
        sink.describe(&MODULE_SCRAPE_DURATION);
        self.queues.describe(sink);
    }

    /// Run one scrape and return its samples.
    pub async fn scrape(&self) -> Exposition {
        let _guard = self.scrape_lock.lock().await;

        let mut exposition = Exposition::new(&self.prefix);
        self.describe(&mut exposition);

        let start = Instant::now();
        let result = self.collect_queues(&mut exposition).await;
        let elapsed = start.elapsed().as_secs_f64();

        let ok = match result {
            Ok(summary) => {
                debug!(
                    fetched = summary.fetched,
                    admitted = summary.admitted,
                    vetoed = summary.vetoed,
                    elapsed_secs = elapsed,
                    "Scrape completed"
                );
                true
            }
            Err(e) => {
                warn!(module = QueueCollector::KIND, error = %e, "Scrape failed");
                false
            }
        };

        let up = if ok { 1.0 } else { 0.0 };
        let module = [QueueCollector::KIND.to_string()];
        exposition.emit(&MODULE_UP, &module, up);
        exposition.emit(&MODULE_SCRAPE_DURATION, &module, elapsed);
        exposition.emit(&UP, &[], up);

        self.last_scrape_ok.store(ok, Ordering::Relaxed);
        exposition
    }

    /// Run one scrape and render it in the OpenMetrics text format.
    pub async fn render(&self) -> Result<String, std::fmt::Error> {
        self.scrape().await.encode()
    }

    async fn collect_queues(&self, sink: &mut Exposition) -> Result<CycleSummary, CollectError> {
        let overview = self.source.overview().await?;
        let ctx = overview.queue_context();
        self.queues.collect(&self.source, &ctx, sink).await
    }
}
