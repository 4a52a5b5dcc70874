//! Layered YAML configuration (§6): a typed server config plus an opaque
//! workflow config tree consulted by activities via dotted paths.
//!
//! Held behind an [`arc_swap::ArcSwap`] so `/reload` swaps the whole tree
//! atomically; a workflow already running keeps the `Arc<EngineConfig>`
//! snapshot it was built against (§9 "shared vs fresh dependencies on
//! reload") rather than observing a reload mid-run.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration document, as loaded from disk and as served
/// (redacted) from `GET /config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub listener: ListenerConfig,
    #[serde(default)]
    pub cron: Vec<CronTriggerConfig>,
    pub state_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub workflow_config: serde_yaml::Value,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub addr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_key: Option<String>,
}

/// One multi-trigger cron entry (§4.7): N workflow names fired together on
/// one schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronTriggerConfig {
    pub workflows: Vec<String>,
    pub schedule: String,
}

/// Marker wrapper for workflow-config fields that must be redacted when the
/// tree is served over `GET /config`. Activities still see the real value —
/// redaction only applies to the tree as rendered for the HTTP response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "sensitive")]
pub struct Sensitive<T>(pub T);

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file at {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file at {}", path.display()))?;
        Ok(config)
    }

    /// A copy of this config's workflow tree with every mapping key that
    /// looks like a sensitive marker (`"sensitive"` wrapper, or a key named
    /// `password`/`token`/`secret`) replaced with a redaction marker.
    pub fn redacted(&self) -> Self {
        let mut clone = self.clone();
        clone.workflow_config = redact_value(&self.workflow_config);
        clone
    }
}

const REDACTED_KEYS: &[&str] = &["password", "token", "secret", "api_key"];

fn redact_value(value: &serde_yaml::Value) -> serde_yaml::Value {
    match value {
        serde_yaml::Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::new();
            for (k, v) in map {
                let is_sensitive_key = k
                    .as_str()
                    .map(|s| REDACTED_KEYS.contains(&s.to_ascii_lowercase().as_str()))
                    .unwrap_or(false);
                let redacted = if is_sensitive_key {
                    serde_yaml::Value::String("***redacted***".to_string())
                } else {
                    redact_value(v)
                };
                out.insert(k.clone(), redacted);
            }
            serde_yaml::Value::Mapping(out)
        }
        serde_yaml::Value::Sequence(seq) => {
            serde_yaml::Value::Sequence(seq.iter().map(redact_value).collect())
        }
        other => other.clone(),
    }
}

/// Resolve a dotted path (`"database.host"`) against a config tree.
///
/// Each segment is matched by exact key first, then by a capitalized
/// variant of the segment — the typed-reflection design's "exact field
/// name, then capitalized" rule collapsed onto a raw YAML mapping, where
/// there is no struct field to reflect on.
pub fn resolve_config_path(tree: &serde_yaml::Value, path: &str) -> Option<serde_yaml::Value> {
    let mut current = tree;
    for segment in path.split('.') {
        let mapping = current.as_mapping()?;
        let exact = mapping.get(serde_yaml::Value::String(segment.to_string()));
        let found = exact.or_else(|| {
            let mut chars = segment.chars();
            let capitalized = match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                None => return None,
            };
            mapping.get(serde_yaml::Value::String(capitalized))
        })?;
        current = found;
    }
    Some(current.clone())
}
