//! Typed error hierarchy for the pbsflow engine.
//!
//! One enum per subsystem, matching §7 of the design: `OrchestratorError`
//! for wiring/cycle/init/execution failures, `RunManagerError` for the
//! run-gate and unknown-workflow cases, `StoreError` for history
//! persistence, and `SchedulerError` for trigger construction. `anyhow` is
//! reserved for the CLI and activity bodies, where only a human-readable
//! chain is needed.

use thiserror::Error;

use crate::activity::ActivityId;

/// Errors from the orchestrator's wiring and execution phases (§4.1).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("activity id collision: {0}")]
    DuplicateActivityId(ActivityId),

    #[error("activity '{activity}' needs a service of type '{type_name}' but no factory is registered for it")]
    MissingService { activity: String, type_name: String },

    #[error("activity '{activity}' has config path '{path}' but it could not be resolved: {reason}")]
    ConfigResolution {
        activity: String,
        path: String,
        reason: String,
    },

    #[error("circular dependency detected among activities: {0:?}")]
    CircularDependency(Vec<ActivityId>),

    #[error("activity '{activity}' has an unresolved named dependency on '{dependency}'")]
    UnresolvedDependency { activity: String, dependency: String },

    #[error("activity '{0}' failed during init: {1}")]
    InitFailed(ActivityId, String),

    #[error("{} activit{} failed: {}", .0.len(), if .0.len() == 1 { "y" } else { "ies" }, .0.join("; "))]
    ExecutionFailed(Vec<String>),
}

impl OrchestratorError {
    /// Build the composite error reported when one or more activity bodies
    /// fail in the same run.
    pub fn execution_failed(messages: Vec<String>) -> Self {
        Self::ExecutionFailed(messages)
    }
}

/// Errors surfaced by the run manager (§4.5, §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunManagerError {
    /// The well-known sentinel returned when a second `run()` arrives while
    /// one is already in flight.
    #[error("a workflow run is already in progress")]
    RunInProgress,

    #[error("unknown workflow(s): {0:?}")]
    UnknownWorkflow(Vec<String>),

    #[error("duplicate workflow name(s) in run request: {0:?}")]
    DuplicateWorkflow(Vec<String>),
}

/// Errors from the state store (§4.6).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run summary has no started_at timestamp")]
    MissingStartedAt,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize run record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from scheduler construction (§4.7).
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("trigger references unknown workflow '{0}'")]
    UnknownWorkflow(String),

    #[error("trigger has no workflow names")]
    EmptyWorkflowList,

    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },
}
