//! Shared domain types for the pbsflow workflow engine.
//!
//! These are the leaf types of the engine (§3 of the design): identity,
//! outcome, and log records that both the orchestrator crate and the
//! binary's HTTP control plane serialize over the wire. Kept dependency-free
//! of `tokio`/`axum` so they can be reused from tests and from the history
//! store without pulling in the runtime.

mod activity_id;
mod execution;
mod log_entry;
mod result;
mod run_summary;

pub use activity_id::ActivityId;
pub use execution::ActivityExecution;
pub use log_entry::LogEntry;
pub use result::{ActivityResult, ActivityState};
pub use run_summary::{RunState, RunSummary};
