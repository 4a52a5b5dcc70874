//! Shared state handed to every HTTP handler (§4.8).

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::metrics::Metrics;
use crate::run_manager::RunManager;
use crate::scheduler::TriggerManager;

/// Cron schedules are fixed at process start; `/reload` swaps the
/// `workflow_config`/server fields an in-flight run has already captured,
/// but does not rebuild or restart the scheduler's trigger set.

/// Build metadata served under `/api/status`'s `build` field.
#[derive(Clone, serde::Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub started_at: DateTime<Utc>,
}

impl BuildInfo {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            started_at,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ArcSwap<EngineConfig>>,
    pub config_path: PathBuf,
    pub run_manager: Arc<RunManager>,
    pub triggers: Arc<TriggerManager>,
    pub metrics: Arc<Metrics>,
    pub build: BuildInfo,
}
