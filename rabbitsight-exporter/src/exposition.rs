//! Sample sinks, long-lived gauge vectors and OpenMetrics encoding.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;

use parking_lot::RwLock;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use crate::registry::{Descriptor, MetricKind};

/// Destination of the samples produced by a collection cycle.
pub trait MetricSink {
    /// Announce a descriptor, independent of any sample.
    fn describe(&mut self, desc: &Descriptor);

    /// Write one sample. `label_values` follows the order of `desc.labels`.
    fn emit(&mut self, desc: &Descriptor, label_values: &[String], value: f64);
}

/// A single emitted sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Exported metric name, without prefix.
    pub name: &'static str,
    /// Gauge or counter.
    pub kind: MetricKind,
    /// Label name/value pairs in schema order.
    pub labels: Vec<(&'static str, String)>,
    /// Sample value.
    pub value: f64,
}

impl Sample {
    /// Value of the label `name`, if present.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

impl MetricSink for Vec<Sample> {
    fn describe(&mut self, _desc: &Descriptor) {}

    fn emit(&mut self, desc: &Descriptor, label_values: &[String], value: f64) {
        debug_assert_eq!(desc.labels.len(), label_values.len(), "{}", desc.name);
        self.push(Sample {
            name: desc.name,
            kind: desc.kind,
            labels: desc
                .labels
                .iter()
                .copied()
                .zip(label_values.iter().cloned())
                .collect(),
            value,
        });
    }
}

/// A gauge with one series per label value tuple.
///
/// Lives for the whole process and is reset at the start of every cycle.
#[derive(Debug)]
pub struct GaugeVec {
    desc: Descriptor,
    series: RwLock<HashMap<Vec<String>, f64>>,
}

impl GaugeVec {
    /// Create an empty gauge vector.
    pub fn new(desc: Descriptor) -> Self {
        Self {
            desc,
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Drop every series.
    pub fn reset(&self) {
        self.series.write().clear();
    }

    /// Set the series identified by `label_values`.
    pub fn set(&self, label_values: &[String], value: f64) {
        debug_assert_eq!(self.desc.labels.len(), label_values.len(), "{}", self.desc.name);
        self.series.write().insert(label_values.to_vec(), value);
    }

    /// Current value of a series.
    pub fn get(&self, label_values: &[String]) -> Option<f64> {
        self.series.read().get(label_values).copied()
    }

    /// Number of series currently set.
    pub fn len(&self) -> usize {
        self.series.read().len()
    }

    /// Whether no series is set.
    pub fn is_empty(&self) -> bool {
        self.series.read().is_empty()
    }

    /// Write every series to `sink`.
    pub fn collect<S: MetricSink + ?Sized>(&self, sink: &mut S) {
        let series = self.series.read();
        for (label_values, value) in series.iter() {
            sink.emit(&self.desc, label_values, *value);
        }
    }
}

type LabelSet = Vec<(String, String)>;
type GaugeFamily = Family<LabelSet, Gauge<f64, AtomicU64>>;
type CounterFamily = Family<LabelSet, Counter<f64, AtomicU64>>;

/// Per-scrape sink encoding samples with `prometheus-client`.
///
/// Every described metric gets its HELP and TYPE lines, even without
/// samples.
#[derive(Debug)]
pub struct Exposition {
    registry: Registry,
    gauges: HashMap<&'static str, GaugeFamily>,
    counters: HashMap<&'static str, CounterFamily>,
    samples: usize,
}

impl Exposition {
    /// Create an empty exposition; every metric name gets `prefix`.
    pub fn new(prefix: &str) -> Self {
        let registry = if prefix.is_empty() {
            Registry::default()
        } else {
            Registry::with_prefix(prefix)
        };

        Self {
            registry,
            gauges: HashMap::new(),
            counters: HashMap::new(),
            samples: 0,
        }
    }

    /// Number of samples written so far.
    pub fn sample_count(&self) -> usize {
        self.samples
    }

    /// Render in the OpenMetrics text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

// The registry appends its own trailing period to help texts.
fn help_text(desc: &Descriptor) -> &'static str {
    desc.help.trim_end_matches('.')
}

/// Escape a label value for the text format; the encoder writes values verbatim.
fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn label_set(desc: &Descriptor, label_values: &[String]) -> LabelSet {
    desc.labels
        .iter()
        .map(|name| (*name).to_string())
        .zip(label_values.iter().map(|v| escape_label_value(v)))
        .collect()
}

impl MetricSink for Exposition {
    fn describe(&mut self, desc: &Descriptor) {
        match desc.kind {
            MetricKind::Gauge => {
                if self.gauges.contains_key(desc.name) {
                    return;
                }
                let family = GaugeFamily::default();
                self.registry
                    .register(desc.name, help_text(desc), family.clone());
                self.gauges.insert(desc.name, family);
            }
            MetricKind::Counter => {
                if self.counters.contains_key(desc.name) {
                    return;
                }
                // The text encoder appends `_total` to counter names.
                let name = desc.name.strip_suffix("_total").unwrap_or(desc.name);
                let family = CounterFamily::default();
                self.registry.register(name, help_text(desc), family.clone());
                self.counters.insert(desc.name, family);
            }
        }
    }

    fn emit(&mut self, desc: &Descriptor, label_values: &[String], value: f64) {
        debug_assert_eq!(desc.labels.len(), label_values.len(), "{}", desc.name);
        self.describe(desc);

        let labels = label_set(desc, label_values);
        match desc.kind {
            MetricKind::Gauge => {
                if let Some(family) = self.gauges.get(desc.name) {
                    family.get_or_create(&labels).set(value);
                }
            }
            MetricKind::Counter => {
                if let Some(family) = self.counters.get(desc.name) {
                    family.get_or_create(&labels).inc_by(value);
                }
            }
        }
        self.samples += 1;
    }
}
