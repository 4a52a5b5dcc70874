use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One captured log line for an activity, as converted from a `tracing`
/// event by the capturing layer (§4.4). `attributes` uses a `BTreeMap` so
/// serialized output is stable across runs, which matters for the history
/// store's on-disk diffability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub level: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

impl LogEntry {
    pub fn new(time: DateTime<Utc>, level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            time,
            level: level.into(),
            message: message.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attributes_round_trip_through_json() {
        let entry = LogEntry::new(Utc::now(), "INFO", "booted")
            .with_attribute("host", "10.0.0.5")
            .with_attribute("retries", 2);
        let raw = serde_json::to_string(&entry).unwrap();
        let back: LogEntry = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.message, "booted");
        assert_eq!(back.attributes.get("host"), Some(&json!("10.0.0.5")));
        assert_eq!(back.attributes.get("retries"), Some(&json!(2)));
    }

    #[test]
    fn empty_attributes_are_omitted_from_serialization() {
        let entry = LogEntry::new(Utc::now(), "DEBUG", "no-op");
        let raw = serde_json::to_string(&entry).unwrap();
        assert!(!raw.contains("attributes"));
    }
}
