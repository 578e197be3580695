//! Queue collector.
//!
//! One collection cycle runs, in order: reset the long-lived gauges, consult
//! the cardinality guard, fetch the queue list, filter and project every
//! queue, then flush the gauges to the sink. Counters reach the sink during
//! projection, gauges only at flush.

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use crate::client::{ScrapeContext, StatsSource};
use crate::config::{ConnectionMode, QueueConfig};
use crate::error::CollectError;
use crate::exposition::MetricSink;
use crate::filter::{EntityFilter, FilterCompileError};
use crate::guard::CardinalityGuard;
use crate::projection::Projector;
use crate::record::EntityRecord;
use crate::registry::MetricRegistry;

/// Outcome of one successful cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Entities returned by the management API.
    pub fetched: usize,
    /// Entities that passed the filter.
    pub admitted: usize,
    /// Whether the cardinality guard skipped the cycle.
    pub vetoed: bool,
}

/// Collects per-queue statistics.
#[derive(Debug)]
pub struct QueueCollector {
    projector: Projector,
    filter: EntityFilter,
    guard: CardinalityGuard,
    connection: ConnectionMode,
    fields: HashSet<&'static str>,
}

impl QueueCollector {
    /// Entity kind name used in logs and the guard.
    pub const KIND: &'static str = "queue";

    /// Management API endpoint listing the queues.
    const ENDPOINT: &'static str = "queues";

    /// Build a collector from the queue settings.
    pub fn new(config: &QueueConfig, connection: ConnectionMode) -> Result<Self, FilterCompileError> {
        let registry = MetricRegistry::queue().exclude(&config.exclude_metrics);
        Ok(Self::from_parts(
            registry,
            config.filter()?,
            CardinalityGuard::new(config.max_queues),
            connection,
        ))
    }

    /// Assemble a collector from already built parts.
    pub fn from_parts(
        registry: MetricRegistry,
        filter: EntityFilter,
        guard: CardinalityGuard,
        connection: ConnectionMode,
    ) -> Self {
        let fields = registry.field_paths();
        Self {
            projector: Projector::new(registry),
            filter,
            guard,
            connection,
            fields,
        }
    }

    /// Announce every active descriptor to `sink`.
    pub fn describe<K: MetricSink + ?Sized>(&self, sink: &mut K) {
        for desc in self.projector.registry().describe() {
            sink.describe(desc);
        }
    }

    /// Run one collection cycle.
    ///
    /// A guard veto is not an error: nothing is fetched and nothing is
    /// emitted. On a fetch failure nothing is emitted either.
    pub async fn collect<S, K>(
        &self,
        source: &S,
        ctx: &ScrapeContext,
        sink: &mut K,
    ) -> Result<CycleSummary, CollectError>
    where
        S: StatsSource,
        K: MetricSink + Send + ?Sized,
    {
        self.projector.reset();

        if !self.guard.check(Self::KIND, ctx.total_count)? {
            return Ok(CycleSummary {
                vetoed: true,
                ..CycleSummary::default()
            });
        }

        let entities = source.fetch_entities(Self::ENDPOINT).await?;
        let summary = self.process(&entities, ctx, sink);

        debug!(
            fetched = summary.fetched,
            admitted = summary.admitted,
            "Collected queue statistics"
        );
        Ok(summary)
    }

    /// Filter, project and flush an already fetched entity list.
    pub fn process<K: MetricSink + ?Sized>(
        &self,
        entities: &[Value],
        ctx: &ScrapeContext,
        sink: &mut K,
    ) -> CycleSummary {
        let registry = self.projector.registry();
        let mut admitted = 0;

        for entity in entities {
            let record = EntityRecord::from_json(entity, registry.label_keys(), &self.fields);
            if !self.filter.admit(&record) {
                continue;
            }
            admitted += 1;

            let labels = self.label_values(&record, ctx);
            self.projector.project(&record, &labels, sink);
        }

        self.projector.flush(sink);

        CycleSummary {
            fetched: entities.len(),
            admitted,
            vetoed: false,
        }
    }

    /// Label values in the order of the queue label schema.
    fn label_values(&self, record: &EntityRecord, ctx: &ScrapeContext) -> Vec<String> {
        let is_self = record.label("node") == ctx.self_node;
        vec![
            ctx.cluster.clone(),
            record.label("vhost").to_string(),
            record.label("name").to_string(),
            record.label("type").to_string(),
            record.label("durable").to_string(),
            record.label("policy").to_string(),
            self.connection.self_label(is_self).to_string(),
        ]
    }
}
