//! The run manager: at-most-one-run gate, live status, history persistence
//! (§4.5).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::activity::ActivityId;
use crate::errors::RunManagerError;
use crate::logcapture::LogCollector;
use crate::metrics::Metrics;
use crate::status::StatusHandler;
use crate::store::StateStore;
use crate::workflow::Workflow;
use pbsflow_common::{ActivityExecution, RunSummary};

/// Builds a fresh `Workflow` for one run, given that run's collaborators.
/// Per-activity logs aren't threaded through here — they flow separately,
/// via the `activity` tracing span each orchestrator task opens (see
/// `CapturingLayer`) into the run manager's shared `LogCollector`.
pub type WorkflowFactory = Box<dyn Fn(StatusHandler) -> Box<dyn Workflow> + Send + Sync>;

struct RunningSlot {
    summary: RunSummary,
    status_handler: StatusHandler,
    log_collector: LogCollector,
    workflow: Arc<AsyncMutex<Box<dyn Workflow>>>,
}

/// Serializes workflow-set execution to at most one in flight, captures live
/// status/logs, and persists finished runs to a [`StateStore`].
pub struct RunManager {
    factories: HashMap<String, WorkflowFactory>,
    store: Arc<dyn StateStore>,
    running: Arc<Mutex<Option<RunningSlot>>>,
    metrics: Arc<Metrics>,
    log_collector: LogCollector,
}

impl RunManager {
    /// `log_collector` must be the same instance installed into the
    /// process's `tracing` subscriber via `CapturingLayer` — a global
    /// subscriber can't be rebuilt per run, so each run instead clears and
    /// reuses this one shared collector (safe because runs are serialized).
    pub fn new(
        factories: HashMap<String, WorkflowFactory>,
        store: Arc<dyn StateStore>,
        log_collector: LogCollector,
    ) -> Self {
        Self::with_metrics(factories, store, log_collector, Arc::new(Metrics::new()))
    }

    /// Same as [`RunManager::new`], but records run counts/gauges onto a
    /// `Metrics` registry shared with the rest of the process (so the HTTP
    /// control plane and the scheduler both feed the same `/metrics`
    /// output, regardless of which one triggered a run).
    pub fn with_metrics(
        factories: HashMap<String, WorkflowFactory>,
        store: Arc<dyn StateStore>,
        log_collector: LogCollector,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            factories,
            store,
            running: Arc::new(Mutex::new(None)),
            metrics,
            log_collector,
        }
    }

    pub fn known_workflows(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    fn validate_names(&self, names: &[String]) -> Result<(), RunManagerError> {
        let mut seen = HashSet::new();
        let mut unknown = Vec::new();
        let mut duplicate = Vec::new();
        for name in names {
            if !self.factories.contains_key(name) {
                unknown.push(name.clone());
            }
            if !seen.insert(name.clone()) {
                duplicate.push(name.clone());
            }
        }
        if !unknown.is_empty() {
            return Err(RunManagerError::UnknownWorkflow(unknown));
        }
        if !duplicate.is_empty() {
            return Err(RunManagerError::DuplicateWorkflow(duplicate));
        }
        Ok(())
    }

    /// CAS-style transition into `Running`: validates names, checks the
    /// gate, and if accepted spawns the background execution task and
    /// returns its `JoinHandle` (the caller decides whether to await it —
    /// fire-and-forget for the HTTP 202 path, awaited for the CLI one-shot).
    pub fn start(
        &self,
        names: Vec<String>,
        ctx: CancellationToken,
    ) -> Result<JoinHandle<()>, RunManagerError> {
        self.validate_names(&names)?;

        let started_at = Utc::now();
        let summary = RunSummary::started(names.clone(), started_at);
        let status_handler = StatusHandler::new();
        // Reuse the process-wide collector `CapturingLayer` taps into; clear
        // it so this run doesn't inherit the previous run's entries.
        let log_collector = self.log_collector.clone();
        log_collector.clear();

        let workflows: Vec<(String, Box<dyn Workflow>)> = names
            .iter()
            .map(|name| {
                let factory = &self.factories[name];
                (name.clone(), factory(status_handler.clone()))
            })
            .collect();
        let workflow: Box<dyn Workflow> = Box::new(crate::workflow::compose(workflows));
        let workflow = Arc::new(AsyncMutex::new(workflow));

        {
            let mut slot = self.running.lock();
            if slot.is_some() {
                return Err(RunManagerError::RunInProgress);
            }
            *slot = Some(RunningSlot {
                summary: summary.clone(),
                status_handler: status_handler.clone(),
                log_collector: log_collector.clone(),
                workflow: workflow.clone(),
            });
        }
        self.metrics.runs_started_total.inc();
        self.metrics.run_in_progress.set(1);

        let running = self.running.clone();
        let store = self.store.clone();
        let metrics = self.metrics.clone();
        let span = tracing::info_span!("run", run_id = %summary.id);

        let handle = tokio::spawn(
            async move {
                let outcome = {
                    let mut guard = workflow.lock().await;
                    guard.execute(&ctx).await
                };

                let results = {
                    let guard = workflow.lock().await;
                    guard.all_results()
                };

                let ended_at = Utc::now();
                let error = outcome.as_ref().err().map(|e| e.to_string());
                if error.is_some() {
                    metrics.runs_failed_total.inc();
                }
                let finished = summary.finish(ended_at, error);
                let executions = assemble_executions(&results, &status_handler, &log_collector);

                if let Err(err) = store.save(finished, executions).await {
                    tracing::error!(error = %err, "failed to persist finished run");
                }

                running.lock().take();
                metrics.run_in_progress.set(0);
            }
            .instrument(span),
        );

        Ok(handle)
    }

    /// Live status snapshot: the last persisted summary if idle, or a
    /// freshly-assembled view of the in-flight run if running.
    pub async fn status(&self) -> Result<(Option<RunSummary>, Vec<ActivityExecution>), crate::errors::StoreError> {
        let snapshot = {
            let guard = self.running.lock();
            guard.as_ref().map(|slot| {
                (
                    slot.summary.clone(),
                    slot.status_handler.clone(),
                    slot.log_collector.clone(),
                    slot.workflow.clone(),
                )
            })
        };

        if let Some((summary, status_handler, log_collector, workflow)) = snapshot {
            let results = workflow.lock().await.all_results();
            let executions = assemble_executions(&results, &status_handler, &log_collector);
            return Ok((Some(summary), executions));
        }

        let history = self.store.history().await?;
        match history.into_iter().next() {
            Some(summary) => {
                let logs = self.store.logs(&summary.id).await.unwrap_or_default();
                Ok((Some(summary), logs))
            }
            None => Ok((None, Vec::new())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Persisted run summaries, most-recent-first. Does not include the
    /// in-flight run, if any — callers that need the live view should use
    /// [`RunManager::status`].
    pub async fn history(&self) -> Result<Vec<RunSummary>, crate::errors::StoreError> {
        self.store.history().await
    }

    /// One run's full execution records, by `RunSummary.id`.
    pub async fn logs_for(&self, id: &str) -> Result<Vec<ActivityExecution>, crate::errors::StoreError> {
        self.store.logs(id).await
    }
}

fn assemble_executions(
    results: &HashMap<ActivityId, pbsflow_common::ActivityResult>,
    status_handler: &StatusHandler,
    log_collector: &LogCollector,
) -> Vec<ActivityExecution> {
    let mut executions: Vec<ActivityExecution> = results
        .iter()
        .map(|(id, result)| ActivityExecution {
            module: id.module.clone(),
            type_name: id.type_name.clone(),
            state: result.state.to_string(),
            status: status_handler.get(id),
            error: result.error.clone(),
            start_time: result.start_time,
            end_time: result.end_time,
            logs: log_collector.logs_for(&id.to_string()),
        })
        .collect();
    pbsflow_common::sort_by_type(&mut executions);
    executions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn manager_with(names: &[&str]) -> RunManager {
        let mut factories: HashMap<String, WorkflowFactory> = HashMap::new();
        for name in names {
            let name = name.to_string();
            factories.insert(
                name,
                Box::new(|_status| Box::new(crate::workflow::compose(Vec::new())) as Box<dyn Workflow>),
            );
        }
        RunManager::new(factories, Arc::new(MemoryStore::new(None)), LogCollector::new())
    }

    #[tokio::test]
    async fn unknown_workflow_name_fails_without_entering_running_state() {
        let manager = manager_with(&["backup"]);
        let err = manager
            .start(vec!["does-not-exist".to_string()], CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, RunManagerError::UnknownWorkflow(_)));
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn duplicate_workflow_name_fails_without_entering_running_state() {
        let manager = manager_with(&["backup"]);
        let err = manager
            .start(vec!["backup".to_string(), "backup".to_string()], CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, RunManagerError::DuplicateWorkflow(_)));
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn metrics_track_in_progress_and_reset_on_completion() {
        let manager = manager_with(&["backup"]);
        let handle = manager.start(vec!["backup".to_string()], CancellationToken::new()).unwrap();
        handle.await.unwrap();
        assert!(!manager.is_running());
        let rendered = manager.metrics.render();
        assert!(rendered.contains("pbsflow_runs_started_total 1"));
        assert!(rendered.contains("pbsflow_run_in_progress 0"));
    }

    #[tokio::test]
    async fn second_start_while_running_is_rejected() {
        let manager = manager_with(&["backup"]);
        let handle = manager.start(vec!["backup".to_string()], CancellationToken::new()).unwrap();
        let err = manager
            .start(vec!["backup".to_string()], CancellationToken::new())
            .unwrap_err();
        assert_eq!(err, RunManagerError::RunInProgress);
        handle.await.unwrap();
        assert!(!manager.is_running());
    }
}
