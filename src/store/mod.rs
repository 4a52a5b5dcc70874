//! State store abstraction (§4.6): two interchangeable backends behind one
//! trait.

pub mod disk;
pub mod memory;

use async_trait::async_trait;

use crate::errors::StoreError;
use pbsflow_common::{ActivityExecution, RunSummary};

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Summaries, most-recent-first.
    async fn history(&self) -> Result<Vec<RunSummary>, StoreError>;

    /// The full execution records for one run, by its `RunSummary.id`.
    async fn logs(&self, id: &str) -> Result<Vec<ActivityExecution>, StoreError>;

    async fn save(
        &self,
        summary: RunSummary,
        executions: Vec<ActivityExecution>,
    ) -> Result<(), StoreError>;
}

pub use disk::DiskStore;
pub use memory::MemoryStore;
