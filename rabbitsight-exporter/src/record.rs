//! Normalized entity records built from management API JSON.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

/// One broker entity snapshot for one scrape cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityRecord {
    /// Identity and descriptive attributes, keyed by top-level field name.
    pub labels: HashMap<String, String>,
    /// Numeric leaves keyed by their dot-joined path.
    pub metrics: HashMap<String, f64>,
}

impl EntityRecord {
    /// Build a record from the decoded JSON of one entity.
    ///
    /// Only numeric leaves whose path is in `fields` are retained. An array at
    /// path `p` contributes its element count as `p_len`; its elements are not
    /// traversed. Labels come from the top-level string or boolean fields named
    /// in `label_keys`.
    pub fn from_json(value: &Value, label_keys: &[&str], fields: &HashSet<&str>) -> Self {
        let mut record = Self::default();

        let Value::Object(map) = value else {
            return record;
        };

        for key in label_keys {
            let label = match map.get(*key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Bool(b)) => b.to_string(),
                _ => continue,
            };
            record.labels.insert((*key).to_string(), label);
        }

        flatten("", value, fields, &mut record.metrics);
        record
    }

    /// Label value, or an empty string when absent.
    pub fn label(&self, key: &str) -> &str {
        self.labels.get(key).map(String::as_str).unwrap_or("")
    }

    /// Numeric value at a flattened path.
    pub fn metric(&self, path: &str) -> Option<f64> {
        self.metrics.get(path).copied()
    }
}

fn flatten(prefix: &str, value: &Value, fields: &HashSet<&str>, out: &mut HashMap<String, f64>) {
    let Value::Object(map) = value else {
        return;
    };

    for (key, child) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match child {
            Value::Number(n) => {
                if let Some(v) = n.as_f64()
                    && fields.contains(path.as_str())
                {
                    out.insert(path, v);
                }
            }
            Value::Object(_) => flatten(&path, child, fields, out),
            Value::Array(items) => {
                let len_path = format!("{}_len", path);
                if fields.contains(len_path.as_str()) {
                    out.insert(len_path, items.len() as f64);
                }
            }
            Value::String(_) | Value::Bool(_) | Value::Null => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KEYS: &[&str] = &["vhost", "name", "durable", "state", "idle_since"];

    fn fields(paths: &[&'static str]) -> HashSet<&'static str> {
        paths.iter().copied().collect()
    }

    #[test]
    fn test_top_level_numbers() {
        let value = json!({ "name": "q1", "messages_ready": 5, "consumers": 0 });
        let record = EntityRecord::from_json(&value, KEYS, &fields(&["messages_ready", "consumers"]));

        assert_eq!(record.metric("messages_ready"), Some(5.0));
        assert_eq!(record.metric("consumers"), Some(0.0));
        assert_eq!(record.label("name"), "q1");
    }

    #[test]
    fn test_nested_paths() {
        let value = json!({
            "message_stats": {
                "publish": 10,
                "publish_details": { "rate": 1.5 }
            }
        });
        let record = EntityRecord::from_json(
            &value,
            KEYS,
            &fields(&["message_stats.publish", "message_stats.publish_details.rate"]),
        );

        assert_eq!(record.metric("message_stats.publish"), Some(10.0));
        assert_eq!(record.metric("message_stats.publish_details.rate"), Some(1.5));
    }

    #[test]
    fn test_unknown_paths_dropped() {
        let value = json!({ "messages_ready": 5, "exclusive_consumer_tag": 3 });
        let record = EntityRecord::from_json(&value, KEYS, &fields(&["messages_ready"]));

        assert_eq!(record.metrics.len(), 1);
        assert_eq!(record.metric("exclusive_consumer_tag"), None);
    }

    #[test]
    fn test_non_numeric_not_coerced() {
        let value = json!({ "messages_ready": "5", "consumers": true, "memory": null });
        let record = EntityRecord::from_json(
            &value,
            KEYS,
            &fields(&["messages_ready", "consumers", "memory"]),
        );

        assert!(record.metrics.is_empty());
    }

    #[test]
    fn test_array_length() {
        let value = json!({
            "slave_nodes": ["rabbit@a", "rabbit@b"],
            "members": [],
            "recoverable_slaves": [1, 2, 3]
        });
        let record = EntityRecord::from_json(
            &value,
            KEYS,
            &fields(&["slave_nodes_len", "members_len"]),
        );

        assert_eq!(record.metric("slave_nodes_len"), Some(2.0));
        assert_eq!(record.metric("members_len"), Some(0.0));
        assert_eq!(record.metric("recoverable_slaves_len"), None);
    }

    #[test]
    fn test_labels_strings_and_bools() {
        let value = json!({
            "vhost": "/",
            "name": "orders",
            "durable": true,
            "state": "running",
            "idle_since": null,
            "policy": 7
        });
        let record = EntityRecord::from_json(&value, KEYS, &HashSet::new());

        assert_eq!(record.label("vhost"), "/");
        assert_eq!(record.label("durable"), "true");
        assert_eq!(record.label("state"), "running");
        assert!(!record.labels.contains_key("idle_since"));
        assert_eq!(record.label("policy"), "");
    }

    #[test]
    fn test_nested_label_keys_ignored() {
        let value = json!({ "arguments": { "name": "inner" } });
        let record = EntityRecord::from_json(&value, KEYS, &HashSet::new());

        assert_eq!(record.label("name"), "");
    }

    #[test]
    fn test_non_object_yields_empty_record() {
        let record = EntityRecord::from_json(&json!([1, 2]), KEYS, &fields(&["_len"]));
        assert_eq!(record, EntityRecord::default());
    }

    #[test]
    fn test_limit_argument_paths() {
        let value = json!({
            "arguments": { "x-max-length": 100 },
            "effective_policy_definition": { "max-length": 50 }
        });
        let record = EntityRecord::from_json(
            &value,
            KEYS,
            &fields(&["arguments.x-max-length", "effective_policy_definition.max-length"]),
        );

        assert_eq!(record.metric("arguments.x-max-length"), Some(100.0));
        assert_eq!(record.metric("effective_policy_definition.max-length"), Some(50.0));
    }
}
