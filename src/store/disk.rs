//! Disk-backed state store: one JSON file per run under a directory (§4.6).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::StateStore;
use crate::errors::StoreError;
use pbsflow_common::{ActivityExecution, RunSummary};

#[derive(Serialize, Deserialize)]
struct RunRecord {
    summary: RunSummary,
    activity_executions: Vec<ActivityExecution>,
}

pub struct DiskStore {
    dir: PathBuf,
    max_count: Option<usize>,
    summaries: RwLock<Vec<RunSummary>>,
}

impl DiskStore {
    /// Creates `dir` if missing, loads every `.json` file in it, skipping
    /// (and logging) any that fail to parse, sorted descending by
    /// `started_at` and truncated to `max_count`.
    pub fn new(dir: impl Into<PathBuf>, max_count: Option<usize>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut summaries = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_record(&path) {
                Ok(record) => summaries.push(record.summary.ensure_id()),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable history file");
                }
            }
        }
        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        if let Some(max) = max_count {
            summaries.truncate(max);
        }

        Ok(Self {
            dir,
            max_count,
            summaries: RwLock::new(summaries),
        })
    }

    fn file_path(&self, summary: &RunSummary) -> PathBuf {
        let local = summary.started_at.with_timezone(&chrono::Local);
        self.dir.join(format!("{}.json", local.format("%Y-%m-%dT%H-%M-%S")))
    }
}

fn load_record(path: &Path) -> Result<RunRecord, StoreError> {
    let raw = std::fs::read_to_string(path)?;
    let record: RunRecord = serde_json::from_str(&raw)?;
    Ok(record)
}

#[async_trait]
impl StateStore for DiskStore {
    async fn history(&self) -> Result<Vec<RunSummary>, StoreError> {
        Ok(self.summaries.read().clone())
    }

    async fn logs(&self, id: &str) -> Result<Vec<ActivityExecution>, StoreError> {
        let Some(summary) = self.summaries.read().iter().find(|s| s.id == id).cloned() else {
            return Ok(Vec::new());
        };
        let path = self.file_path(&summary);
        match load_record(&path) {
            Ok(record) => Ok(record.activity_executions),
            Err(_) => Ok(Vec::new()),
        }
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

        let path = self.file_path(&summary);
        let record = RunRecord {
            summary: summary.clone(),
            activity_executions: executions,
        };
        let raw = serde_json::to_string_pretty(&record)?;
        std::fs::write(&path, raw)?;

        let mut summaries = self.summaries.write();
        summaries.insert(0, summary);
        if let Some(max) = self.max_count
            && summaries.len() > max
        {
            let evicted: Vec<RunSummary> = summaries.split_off(max);
            for old in evicted {
                let _ = std::fs::remove_file(self.file_path(&old));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn finished(workflows: Vec<&str>) -> RunSummary {
        let started = RunSummary::started(workflows.into_iter().map(String::from).collect(), Utc::now());
        started.finish(Utc::now(), None)
    }

    #[tokio::test]
    async fn save_persists_a_file_and_is_readable_after_reload() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::new(dir.path(), None).unwrap();
        let summary = finished(vec!["backup"]);
        let id = summary.id.clone();
        store.save(summary, vec![]).await.unwrap();

        let reopened = DiskStore::new(dir.path(), None).unwrap();
        let history = reopened.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, id);
    }

    #[tokio::test]
    async fn max_count_evicts_oldest_file_from_disk() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::new(dir.path(), Some(1)).unwrap();
        store.save(finished(vec!["backup"]), vec![]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        store.save(finished(vec!["power_off"]), vec![]).await.unwrap();

        let history = store.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].workflows, vec!["power_off"]);

        let remaining: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn non_json_files_are_ignored_on_load() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("README.txt"), "not history").unwrap();
        let store = DiskStore::new(dir.path(), None).unwrap();
        assert!(store.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unparseable_json_file_is_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("2024-01-01T00-00-00.json"), "{not json").unwrap();
        let store = DiskStore::new(dir.path(), None).unwrap();
        assert!(store.history().await.unwrap().is_empty());
    }
}
