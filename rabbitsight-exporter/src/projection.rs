//! Projection of entity records onto registered metrics, plus the derived
//! state, idle-since and effective-limit series.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use crate::exposition::{GaugeVec, MetricSink};
use crate::record::EntityRecord;
use crate::registry::{LimitDef, MetricRegistry};

/// Broker format used by releases that do not emit RFC 3339 timestamps.
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse an `idle_since` value, RFC 3339 first, then the legacy format as UTC.
pub fn parse_idle_since(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, LEGACY_TIMESTAMP_FORMAT).map(|t| t.and_utc())
}

fn epoch_seconds(t: DateTime<Utc>) -> f64 {
    t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) / 1e9
}

/// Effective state of an entity for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedState {
    /// State reported by the state indicator.
    pub state: String,
    /// Idle-since timestamp in seconds since epoch, when known.
    pub idle_since: Option<f64>,
}

/// Derive the effective state from the `state` and `idle_since` labels.
///
/// A parsable `idle_since` turns `running` into `idle`; any other state is
/// kept. An unparsable `idle_since` is logged and leaves the state as is.
pub fn derive_state(record: &EntityRecord) -> DerivedState {
    let mut state = record.label("state").to_string();
    let mut idle_since = None;

    let raw = record.label("idle_since");
    if !raw.is_empty() {
        match parse_idle_since(raw) {
            Ok(t) => {
                idle_since = Some(epoch_seconds(t));
                if state == "running" {
                    state = "idle".to_string();
                }
            }
            Err(e) => {
                warn!(
                    vhost = %record.label("vhost"),
                    name = %record.label("name"),
                    idle_since = %raw,
                    error = %e,
                    "Error parsing idle since time"
                );
            }
        }
    }

    DerivedState { state, idle_since }
}

/// The tighter of two optional bounds.
pub fn lower_of(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

/// Resolve a limit from its override and policy fields.
///
/// A negative result is not a limit and yields `None`.
pub fn effective_limit(record: &EntityRecord, rule: &LimitDef) -> Option<f64> {
    lower_of(
        record.metric(rule.override_field),
        record.metric(rule.policy_field),
    )
    .filter(|limit| *limit >= 0.0)
}

/// Long-lived gauges of one entity kind and the rules feeding them.
#[derive(Debug)]
pub struct Projector {
    registry: MetricRegistry,
    gauges: Vec<(&'static str, GaugeVec)>,
    /// Every limit rule; the gauge is `None` when excluded.
    limits: Vec<(LimitDef, Option<GaugeVec>)>,
    state: GaugeVec,
    idle_since: GaugeVec,
}

impl Projector {
    /// Create the gauge vectors for every surviving descriptor.
    pub fn new(registry: MetricRegistry) -> Self {
        let gauges = registry
            .gauges()
            .iter()
            .map(|m| (m.field, GaugeVec::new(m.desc)))
            .collect();
        let limits = registry
            .limit_rules()
            .iter()
            .map(|rule| {
                let gauge = registry
                    .exports_limit(rule.key)
                    .then(|| GaugeVec::new(rule.desc));
                (*rule, gauge)
            })
            .collect();

        Self {
            gauges,
            limits,
            state: GaugeVec::new(*registry.state()),
            idle_since: GaugeVec::new(*registry.idle_since()),
            registry,
        }
    }

    /// The registry this projector was built from.
    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Drop every gauge series.
    pub fn reset(&self) {
        for (_, gauge) in &self.gauges {
            gauge.reset();
        }
        for gauge in self.limits.iter().filter_map(|(_, g)| g.as_ref()) {
            gauge.reset();
        }
        self.state.reset();
        self.idle_since.reset();
    }

    /// Project one admitted record.
    ///
    /// Gauges are set for the present fields only. Counters are written to
    /// `sink` immediately, as zero when the field is absent.
    pub fn project<S: MetricSink + ?Sized>(
        &self,
        record: &EntityRecord,
        label_values: &[String],
        sink: &mut S,
    ) {
        for (field, gauge) in &self.gauges {
            if let Some(value) = record.metric(field) {
                gauge.set(label_values, value);
            }
        }

        for counter in self.registry.counters() {
            let value = record.metric(counter.field).unwrap_or(0.0);
            sink.emit(&counter.desc, label_values, value);
        }

        let derived = derive_state(record);
        if let Some(idle_since) = derived.idle_since {
            self.idle_since.set(label_values, idle_since);
        }
        let mut state_labels = label_values.to_vec();
        state_labels.push(derived.state);
        self.state.set(&state_labels, 1.0);

        for (rule, gauge) in &self.limits {
            let limit = effective_limit(record, rule);
            if let (Some(limit), Some(gauge)) = (limit, gauge) {
                gauge.set(label_values, limit);
            }
        }
    }

    /// Write every gauge series set during this cycle to `sink`.
    pub fn flush<S: MetricSink + ?Sized>(&self, sink: &mut S) {
        for gauge in self.limits.iter().filter_map(|(_, g)| g.as_ref()) {
            gauge.collect(sink);
        }
        for (_, gauge) in &self.gauges {
            gauge.collect(sink);
        }
        self.state.collect(sink);
        self.idle_since.collect(sink);
    }
}
