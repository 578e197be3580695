//! Static metric descriptor tables.
//!
//! Every exported metric is described once here: the dot-separated path of
//! the source field in the management API JSON, the exported name, the help
//! text, the metric kind and the label schema. A [`MetricRegistry`] is built
//! from these tables at startup and pruned by the operator's exclusion list;
//! after construction it is never mutated.

use std::collections::HashSet;

use tracing::debug;

/// Kind of an exported metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Gauge,
    Counter,
}

/// Identity of one exported metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor {
    /// Exported name, without the exporter prefix.
    pub name: &'static str,
    /// Help text.
    pub help: &'static str,
    /// Gauge or counter.
    pub kind: MetricKind,
    /// Ordered label names.
    pub labels: &'static [&'static str],
}

/// A descriptor projected from a single source field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDef {
    /// Flattened source field path, e.g. `message_stats.publish`.
    pub field: &'static str,
    /// The exported metric.
    pub desc: Descriptor,
}

/// An effective-limit resolved from a direct override and a policy default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitDef {
    /// Limit key used for exclusion, e.g. `max-length`.
    pub key: &'static str,
    /// Per-entity override field.
    pub override_field: &'static str,
    /// Policy-derived default field.
    pub policy_field: &'static str,
    /// The exported gauge.
    pub desc: Descriptor,
}

/// Label schema of every queue series.
pub const QUEUE_LABELS: &[&str] = &[
    "cluster", "vhost", "queue", "type", "durable", "policy", "self",
];

/// Label schema of the queue state indicator.
pub const QUEUE_STATE_LABELS: &[&str] = &[
    "cluster", "vhost", "queue", "type", "durable", "policy", "self", "state",
];

/// Top-level JSON fields read into queue record labels.
pub const QUEUE_LABEL_KEYS: &[&str] = &[
    "vhost",
    "name",
    "type",
    "durable",
    "policy",
    "state",
    "node",
    "idle_since",
];

const fn gauge(field: &'static str, name: &'static str, help: &'static str) -> MetricDef {
    MetricDef {
        field,
        desc: Descriptor {
            name,
            help,
            kind: MetricKind::Gauge,
            labels: QUEUE_LABELS,
        },
    }
}

const fn counter(field: &'static str, name: &'static str, help: &'static str) -> MetricDef {
    MetricDef {
        field,
        desc: Descriptor {
            name,
            help,
            kind: MetricKind::Counter,
            labels: QUEUE_LABELS,
        },
    }
}

const QUEUE_GAUGES: &[MetricDef] = &[
    gauge(
        "messages_ready",
        "queue_messages_ready",
        "Number of messages ready to be delivered to clients.",
    ),
    gauge(
        "messages_unacknowledged",
        "queue_messages_unacknowledged",
        "Number of messages delivered to clients but not yet acknowledged.",
    ),
    gauge(
        "messages",
        "queue_messages",
        "Sum of ready and unacknowledged messages (queue depth).",
    ),
    gauge(
        "messages_ready_ram",
        "queue_messages_ready_ram",
        "Number of messages from messages_ready which are resident in ram.",
    ),
    gauge(
        "messages_unacknowledged_ram",
        "queue_messages_unacknowledged_ram",
        "Number of messages from messages_unacknowledged which are resident in ram.",
    ),
    gauge(
        "messages_ram",
        "queue_messages_ram",
        "Total number of messages which are resident in ram.",
    ),
    gauge(
        "messages_persistent",
        "queue_messages_persistent",
        "Total number of persistent messages in the queue (will always be 0 for transient queues).",
    ),
    gauge(
        "message_bytes",
        "queue_message_bytes",
        "Sum of the size of all message bodies in the queue. This does not include the message properties (including headers) or any overhead.",
    ),
    gauge(
        "message_bytes_ready",
        "queue_message_bytes_ready",
        "Like message_bytes but counting only those messages ready to be delivered to clients.",
    ),
    gauge(
        "message_bytes_unacknowledged",
        "queue_message_bytes_unacknowledged",
        "Like message_bytes but counting only those messages delivered to clients but not yet acknowledged.",
    ),
    gauge(
        "message_bytes_ram",
        "queue_message_bytes_ram",
        "Like message_bytes but counting only those messages which are in RAM.",
    ),
    gauge(
        "message_bytes_persistent",
        "queue_message_bytes_persistent",
        "Like message_bytes but counting only those messages which are persistent.",
    ),
    gauge("consumers", "queue_consumers", "Number of consumers."),
    gauge(
        "consumer_utilisation",
        "queue_consumer_utilisation",
        "Fraction of the time (between 0.0 and 1.0) that the queue is able to immediately deliver messages to consumers.",
    ),
    gauge(
        "memory",
        "queue_memory",
        "Bytes of memory consumed by the Erlang process associated with the queue, including stack, heap and internal structures.",
    ),
    gauge(
        "head_message_timestamp",
        "queue_head_message_timestamp",
        "The timestamp property of the first message in the queue, if present.",
    ),
    gauge(
        "garbage_collection.min_heap_size",
        "queue_gc_min_heap",
        "Minimum heap size in words.",
    ),
    gauge(
        "garbage_collection.min_bin_vheap_size",
        "queue_gc_min_vheap",
        "Minimum binary virtual heap size in words.",
    ),
    gauge(
        "garbage_collection.fullsweep_after",
        "queue_gc_collections_before_fullsweep",
        "Maximum generational collections before fullsweep.",
    ),
    gauge(
        "slave_nodes_len",
        "queue_slaves_nodes_len",
        "Number of slave nodes attached to the queue.",
    ),
    gauge(
        "synchronised_slave_nodes_len",
        "queue_synchronised_slave_nodes_len",
        "Number of slave nodes in sync to the queue.",
    ),
    gauge(
        "members_len",
        "queue_member_nodes_len",
        "Number of quorum queue member nodes for the queue.",
    ),
    gauge(
        "online_len",
        "queue_online_nodes_len",
        "Number of online members nodes for the queue.",
    ),
    gauge(
        "message_stats.publish_details.rate",
        "queue_messages_publish_rate",
        "Rate at which messages are entering the server.",
    ),
    gauge(
        "message_stats.deliver_no_ack_details.rate",
        "queue_messages_deliver_no_ack_rate",
        "Rate at which messages are delivered to consumers that use automatic acknowledgements.",
    ),
    gauge(
        "message_stats.deliver_details.rate",
        "queue_messages_deliver_rate",
        "Rate at which messages are delivered to consumers that use manual acknowledgements.",
    ),
];

const QUEUE_COUNTERS: &[MetricDef] = &[
    counter(
        "disk_reads",
        "queue_disk_reads_total",
        "Total number of times messages have been read from disk by this queue since it started.",
    ),
    counter(
        "disk_writes",
        "queue_disk_writes_total",
        "Total number of times messages have been written to disk by this queue since it started.",
    ),
    counter(
        "message_stats.publish",
        "queue_messages_published_total",
        "Count of messages published.",
    ),
    counter(
        "message_stats.confirm",
        "queue_messages_confirmed_total",
        "Count of messages confirmed.",
    ),
    counter(
        "message_stats.deliver",
        "queue_messages_delivered_total",
        "Count of messages delivered in acknowledgement mode to consumers.",
    ),
    counter(
        "message_stats.deliver_no_ack",
        "queue_messages_delivered_noack_total",
        "Count of messages delivered in no-acknowledgement mode to consumers.",
    ),
    counter(
        "message_stats.get",
        "queue_messages_get_total",
        "Count of messages delivered in acknowledgement mode in response to basic.get.",
    ),
    counter(
        "message_stats.get_no_ack",
        "queue_messages_get_noack_total",
        "Count of messages delivered in no-acknowledgement mode in response to basic.get.",
    ),
    counter(
        "message_stats.redeliver",
        "queue_messages_redelivered_total",
        "Count of subset of messages in deliver_get which had the redelivered flag set.",
    ),
    counter(
        "message_stats.return",
        "queue_messages_returned_total",
        "Count of messages returned to publisher as unroutable.",
    ),
    counter(
        "message_stats.ack",
        "queue_messages_ack_total",
        "Count of messages acknowledged by consumers.",
    ),
    counter(
        "reductions",
        "queue_reductions_total",
        "Count of reductions which take place on this process.",
    ),
    counter(
        "garbage_collection.minor_gcs",
        "queue_gc_minor_collections_total",
        "Number of minor GCs.",
    ),
];

const QUEUE_LIMITS: &[LimitDef] = &[
    LimitDef {
        key: "max-length-bytes",
        override_field: "arguments.x-max-length-bytes",
        policy_field: "effective_policy_definition.max-length-bytes",
        desc: Descriptor {
            name: "queue_max_length_bytes",
            help: "Total body size for ready messages a queue can contain before it starts to drop them from its head.",
            kind: MetricKind::Gauge,
            labels: QUEUE_LABELS,
        },
    },
    LimitDef {
        key: "max-length",
        override_field: "arguments.x-max-length",
        policy_field: "effective_policy_definition.max-length",
        desc: Descriptor {
            name: "queue_max_length",
            help: "How many (ready) messages a queue can contain before it starts to drop them from its head.",
            kind: MetricKind::Gauge,
            labels: QUEUE_LABELS,
        },
    },
];

const QUEUE_STATE: Descriptor = Descriptor {
    name: "queue_state",
    help: "A metric with a value of constant '1' if the queue is in a certain state.",
    kind: MetricKind::Gauge,
    labels: QUEUE_STATE_LABELS,
};

const QUEUE_IDLE_SINCE: Descriptor = Descriptor {
    name: "queue_idle_since_seconds",
    help: "Starttime where the queue switched to idle state; in seconds since epoch (1970).",
    kind: MetricKind::Gauge,
    labels: QUEUE_LABELS,
};

/// The active descriptor set of one entity kind.
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    /// Label keys read from the entity JSON.
    label_keys: &'static [&'static str],
    gauges: Vec<MetricDef>,
    counters: Vec<MetricDef>,
    /// Every limit rule, including excluded ones.
    limit_rules: &'static [LimitDef],
    /// Keys of the limit gauges that survived exclusion.
    limits: Vec<&'static str>,
    state: Descriptor,
    idle_since: Descriptor,
}

impl MetricRegistry {
    /// Full descriptor set for queues.
    pub fn queue() -> Self {
        Self {
            label_keys: QUEUE_LABEL_KEYS,
            gauges: QUEUE_GAUGES.to_vec(),
            counters: QUEUE_COUNTERS.to_vec(),
            limit_rules: QUEUE_LIMITS,
            limits: QUEUE_LIMITS.iter().map(|l| l.key).collect(),
            state: QUEUE_STATE,
            idle_since: QUEUE_IDLE_SINCE,
        }
    }

    /// Remove every descriptor named in `excluded`.
    ///
    /// An entry matches a descriptor by source field path, by limit key or by
    /// exported name.
    pub fn exclude<S: AsRef<str>>(mut self, excluded: &[S]) -> Self {
        for name in excluded.iter().map(AsRef::as_ref) {
            let before = self.gauges.len() + self.counters.len() + self.limits.len();

            self.gauges
                .retain(|m| m.field != name && m.desc.name != name);
            self.counters
                .retain(|m| m.field != name && m.desc.name != name);
            let rules = self.limit_rules;
            self.limits.retain(|key| {
                rules
                    .iter()
                    .find(|l| l.key == *key)
                    .is_some_and(|l| l.key != name && l.desc.name != name)
            });

            let removed = before - (self.gauges.len() + self.counters.len() + self.limits.len());
            debug!(metric = %name, removed, "Excluded metric");
        }
        self
    }

    /// Top-level label keys of the entity JSON.
    pub fn label_keys(&self) -> &'static [&'static str] {
        self.label_keys
    }

    /// Gauges projected directly from a source field.
    pub fn gauges(&self) -> &[MetricDef] {
        &self.gauges
    }

    /// Counters projected directly from a source field.
    pub fn counters(&self) -> &[MetricDef] {
        &self.counters
    }

    /// All limit rules, whether or not their gauge is still exported.
    pub fn limit_rules(&self) -> &'static [LimitDef] {
        self.limit_rules
    }

    /// Whether the gauge of the limit `key` survived exclusion.
    pub fn exports_limit(&self, key: &str) -> bool {
        self.limits.iter().any(|k| *k == key)
    }

    /// The state indicator descriptor.
    pub fn state(&self) -> &Descriptor {
        &self.state
    }

    /// The idle-since timestamp descriptor.
    pub fn idle_since(&self) -> &Descriptor {
        &self.idle_since
    }

    /// Source field paths a record must retain to feed this registry.
    ///
    /// Limit source fields are always included, so limits stay computable
    /// even when their gauge is excluded.
    pub fn field_paths(&self) -> HashSet<&'static str> {
        let mut paths: HashSet<&'static str> = self
            .gauges
            .iter()
            .chain(self.counters.iter())
            .map(|m| m.field)
            .collect();
        for limit in self.limit_rules {
            paths.insert(limit.override_field);
            paths.insert(limit.policy_field);
        }
        paths
    }

    /// Every exported descriptor, each exactly once.
    pub fn describe(&self) -> impl Iterator<Item = &Descriptor> {
        let limits = self
            .limit_rules
            .iter()
            .filter(|l| self.exports_limit(l.key))
            .map(|l| &l.desc);

        limits
            .chain(self.gauges.iter().map(|m| &m.desc))
            .chain([&self.state, &self.idle_since])
            .chain(self.counters.iter().map(|m| &m.desc))
    }
}
