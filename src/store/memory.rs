//! In-memory state store: most-recent-first, with an optional cap.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::StateStore;
use crate::errors::StoreError;
use pbsflow_common::{ActivityExecution, RunSummary};

struct Run {
    summary: RunSummary,
    executions: Vec<ActivityExecution>,
}

pub struct MemoryStore {
    max_count: Option<usize>,
    runs: RwLock<Vec<Run>>,
}

impl MemoryStore {
    pub fn new(max_count: Option<usize>) -> Self {
        Self {
            max_count,
            runs: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn history(&self) -> Result<Vec<RunSummary>, StoreError> {
        Ok(self.runs.read().iter().map(|r| r.summary.clone()).collect())
    }

    async fn logs(&self, id: &str) -> Result<Vec<ActivityExecution>, StoreError> {
        Ok(self
            .runs
            .read()
            .iter()
            .find(|r| r.summary.id == id)
            .map(|r| r.executions.clone())
            .unwrap_or_default())
    }

    async fn save(
        &self,
        mut summary: RunSummary,
        executions: Vec<ActivityExecution>,
    ) -> Result<(), StoreError> {
        if summary.ended_at.is_none() {
            return Err(StoreError::MissingStartedAt);
        }
        summary = summary.ensure_id();

        let mut runs = self.runs.write();
        runs.insert(0, Run { summary, executions });
        if let Some(max) = self.max_count {
            runs.truncate(max);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn finished_summary(workflows: Vec<&str>) -> RunSummary {
        let started = RunSummary::started(workflows.into_iter().map(String::from).collect(), Utc::now());
        started.finish(Utc::now(), None)
    }

    #[tokio::test]
    async fn save_then_history_returns_most_recent_first() {
        let store = MemoryStore::new(None);
        store.save(finished_summary(vec!["backup"]), Vec::new()).await.unwrap();
        store.save(finished_summary(vec!["power_off"]), Vec::new()).await.unwrap();
        let history = store.history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].workflows, vec!["power_off"]);
    }

    #[tokio::test]
    async fn max_count_evicts_oldest() {
        let store = MemoryStore::new(Some(1));
        store.save(finished_summary(vec!["backup"]), Vec::new()).await.unwrap();
        store.save(finished_summary(vec!["power_off"]), Vec::new()).await.unwrap();
        let history = store.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].workflows, vec!["power_off"]);
    }

    #[tokio::test]
    async fn save_without_ended_at_fails() {
        let store = MemoryStore::new(None);
        let unfinished = RunSummary::started(vec!["backup".to_string()], Utc::now());
        let err = store.save(unfinished, Vec::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingStartedAt));
    }
}
