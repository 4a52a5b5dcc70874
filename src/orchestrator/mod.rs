//! The dependency-resolved activity orchestrator (§4.1).

mod graph;

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::activity::{Activity, ActivityId};
use crate::config::resolve_config_path;
use crate::errors::OrchestratorError;
use crate::factory::FactoryRegistry;
use pbsflow_common::{ActivityResult, ActivityState};

use graph::DependencyGraph;

/// Passed to every activity body and to `Orchestrator::execute`/`Workflow::execute`.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    pub cancellation: &'a CancellationToken,
}

impl<'a> RunContext<'a> {
    pub fn new(cancellation: &'a CancellationToken) -> Self {
        Self { cancellation }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}

struct Registered {
    id: ActivityId,
    type_id: TypeId,
    type_name: &'static str,
    any: Arc<dyn std::any::Any + Send + Sync>,
    activity: Arc<dyn Activity>,
}

/// Runs a set of [`Activity`] values to completion, honoring the
/// dependency, service, and config edges each one declares.
pub struct Orchestrator {
    config: Option<serde_yaml::Value>,
    factories: FactoryRegistry,
    pending: Vec<Registered>,
    wired: Option<Wired>,
}

struct Wired {
    ids: Vec<ActivityId>,
    id_index: HashMap<ActivityId, usize>,
    activities: Vec<Arc<dyn Activity>>,
    graph: DependencyGraph,
    results: Arc<Vec<RwLock<ActivityResult>>>,
}

impl Orchestrator {
    pub fn new(config: Option<serde_yaml::Value>, factories: FactoryRegistry) -> Self {
        Self {
            config,
            factories,
            pending: Vec::new(),
            wired: None,
        }
    }

    /// Register an activity. Creates its `Result` immediately in `NotStarted`
    /// once wiring runs; registration itself only records the value.
    pub fn add_activity<A: Activity>(&mut self, activity: A) -> &mut Self {
        let activity = Arc::new(activity);
        let any: Arc<dyn std::any::Any + Send + Sync> = activity.clone();
        let as_activity: Arc<dyn Activity> = activity;
        let descriptor = as_activity.descriptor();
        let id = descriptor
            .id
            .clone()
            .unwrap_or_else(|| ActivityId::new("unknown", std::any::type_name::<A>()));
        self.pending.push(Registered {
            id,
            type_id: TypeId::of::<A>(),
            type_name: std::any::type_name::<A>(),
            any,
            activity: as_activity,
        });
        self
    }

    /// Run the full wiring phase (§4.1 steps 1-7). Consumes the pending
    /// registrations; safe to call only once.
    fn wire(&mut self) -> Result<(), OrchestratorError> {
        if self.wired.is_some() {
            return Ok(());
        }

        let registered = std::mem::take(&mut self.pending);
        let mut id_index = HashMap::with_capacity(registered.len());
        let mut type_index = HashMap::with_capacity(registered.len());
        for (idx, reg) in registered.iter().enumerate() {
            if id_index.insert(reg.id.clone(), idx).is_some() {
                return Err(OrchestratorError::DuplicateActivityId(reg.id.clone()));
            }
            type_index.insert(reg.type_id, idx);
        }

        let mut graph = DependencyGraph::new(registered.len());

        for (idx, reg) in registered.iter().enumerate() {
            let descriptor = reg.activity.descriptor();

            for config_dep in &descriptor.configs {
                let tree = self.config.clone().unwrap_or(serde_yaml::Value::Null);
                let resolved = resolve_config_path(&tree, &config_dep.path).ok_or_else(|| {
                    OrchestratorError::ConfigResolution {
                        activity: reg.id.to_string(),
                        path: config_dep.path.clone(),
                        reason: "path not found in configuration tree".to_string(),
                    }
                })?;
                (config_dep.assign)(&resolved).map_err(|reason| {
                    OrchestratorError::ConfigResolution {
                        activity: reg.id.to_string(),
                        path: config_dep.path.clone(),
                        reason,
                    }
                })?;
            }

            for service_dep in &descriptor.services {
                let value = self
                    .factories
                    .resolve(service_dep.service_type, &reg.id)
                    .ok_or_else(|| OrchestratorError::MissingService {
                        activity: reg.id.to_string(),
                        type_name: service_dep.service_type_name.to_string(),
                    })?;
                (service_dep.assign)(value).map_err(|_| OrchestratorError::MissingService {
                    activity: reg.id.to_string(),
                    type_name: service_dep.service_type_name.to_string(),
                })?;
            }

            for named in &descriptor.named_deps {
                let target_idx = *type_index.get(&named.target_type).ok_or_else(|| {
                    OrchestratorError::UnresolvedDependency {
                        activity: reg.id.to_string(),
                        dependency: named.target_type_name.to_string(),
                    }
                })?;
                graph.add_edge(target_idx, idx);
                (named.assign)(registered[target_idx].any.clone()).map_err(|_| {
                    OrchestratorError::UnresolvedDependency {
                        activity: reg.id.to_string(),
                        dependency: named.target_type_name.to_string(),
                    }
                })?;
            }

            for ordering in &descriptor.ordering_deps {
                let target_idx = *type_index.get(&ordering.target_type).ok_or_else(|| {
                    OrchestratorError::UnresolvedDependency {
                        activity: reg.id.to_string(),
                        dependency: ordering.target_type_name.to_string(),
                    }
                })?;
                graph.add_edge(target_idx, idx);
            }
        }

        if let Err(cycle) = graph.check_acyclic() {
            let ids = cycle.into_iter().map(|idx| registered[idx].id.clone()).collect();
            return Err(OrchestratorError::CircularDependency(ids));
        }

        let results = Arc::new(
            registered
                .iter()
                .map(|_| RwLock::new(ActivityResult::not_started()))
                .collect::<Vec<_>>(),
        );

        let ids: Vec<ActivityId> = registered.iter().map(|r| r.id.clone()).collect();
        let activities: Vec<Arc<dyn Activity>> = registered.iter().map(|r| r.activity.clone()).collect();

        for (idx, reg) in registered.iter().enumerate() {
            if let Err(reason) = reg.activity.init() {
                return Err(OrchestratorError::InitFailed(reg.id.clone(), reason));
            }
            let _ = idx;
        }

        self.wired = Some(Wired {
            ids,
            id_index,
            activities,
            graph,
            results,
        });
        let _ = registered.len();
        let _ = type_index.len();
        Ok(())
    }

    /// Run the DAG once. Idempotent after it returns: a second call re-runs
    /// every activity from scratch since results are reset by the task set.
    pub async fn execute(&mut self, ctx: &CancellationToken) -> Result<(), OrchestratorError> {
        self.wire()?;
        let wired = self.wired.as_ref().expect("wiring just ran");

        let count = wired.activities.len();
        if count == 0 {
            return Ok(());
        }

        let senders: Vec<tokio::sync::watch::Sender<bool>> = (0..count)
            .map(|_| tokio::sync::watch::channel(false).0)
            .collect();
        let receivers: Vec<tokio::sync::watch::Receiver<bool>> =
            senders.iter().map(|s| s.subscribe()).collect();

        let mut join_set = JoinSet::new();

        for idx in 0..count {
            let activity = wired.activities[idx].clone();
            let id = wired.ids[idx].clone();
            let dep_indices: Vec<usize> = wired.graph.dependencies(idx).to_vec();
            let dep_receivers: Vec<tokio::sync::watch::Receiver<bool>> =
                dep_indices.iter().map(|&d| receivers[d].clone()).collect();
            let results = wired.results.clone();
            let sender = senders[idx].clone();
            let token = ctx.clone();
            let span = tracing::info_span!("activity", activity = %id);

            join_set.spawn(
                async move {
                    run_one(idx, activity, dep_indices, dep_receivers, results, token).await;
                    let _ = sender.send(true);
                }
                .instrument(span),
            );
        }

        while join_set.join_next().await.is_some() {}

        let mut failures = Vec::new();
        for (idx, id) in wired.ids.iter().enumerate() {
            let result = wired.results[idx].read();
            if let Some(error) = &result.error {
                failures.push(format!("{id}: {error}"));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::execution_failed(failures))
        }
    }

    pub fn result(&self, id: &ActivityId) -> Option<ActivityResult> {
        let wired = self.wired.as_ref()?;
        let idx = *wired.id_index.get(id)?;
        Some(wired.results[idx].read().clone())
    }

    /// Thread-safe snapshot of every activity's current result, keyed by id.
    pub fn all_results(&self) -> HashMap<ActivityId, ActivityResult> {
        let Some(wired) = self.wired.as_ref() else {
            return HashMap::new();
        };
        wired
            .ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), wired.results[idx].read().clone()))
            .collect()
    }
}

async fn run_one(
    idx: usize,
    activity: Arc<dyn Activity>,
    dep_indices: Vec<usize>,
    mut dep_receivers: Vec<tokio::sync::watch::Receiver<bool>>,
    results: Arc<Vec<RwLock<ActivityResult>>>,
    token: CancellationToken,
) {
    {
        let mut result = results[idx].write();
        *result = ActivityResult::pending();
    }

    if dep_receivers.is_empty() {
        if token.is_cancelled() {
            let mut result = results[idx].write();
            *result = ActivityResult::skipped();
            return;
        }
    } else {
        loop {
            let mut all_ready = true;
            for recv in dep_receivers.iter() {
                if !*recv.borrow() {
                    all_ready = false;
                }
            }
            if all_ready {
                break;
            }

            let waits = dep_receivers
                .iter_mut()
                .map(|recv| Box::pin(recv.changed()))
                .collect::<Vec<_>>();

            tokio::select! {
                _ = token.cancelled() => {
                    let mut result = results[idx].write();
                    *result = ActivityResult::skipped();
                    return;
                }
                _ = futures::future::select_all(waits) => {}
            }
        }

        for &dep in &dep_indices {
            let dep_succeeded = results[dep].read().is_success();
            if !dep_succeeded {
                let mut result = results[idx].write();
                *result = ActivityResult::skipped();
                return;
            }
        }
    }

    let start_time = chrono::Utc::now();
    {
        let mut result = results[idx].write();
        *result = ActivityResult::running(start_time);
    }

    let run_ctx = RunContext::new(&token);
    let outcome = activity.execute(run_ctx).await;
    let end_time = chrono::Utc::now();

    let error = outcome.err();
    if let Some(err) = &error {
        tracing::error!(error = %err, "activity failed");
    }
    let mut result = results[idx].write();
    *result = ActivityResult::completed(start_time, end_time, error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use parking_lot::Mutex;

    struct First(Arc<AtomicUsize>);
    impl Activity for First {
        fn descriptor(&self) -> crate::activity::ActivityDescriptor {
            crate::activity::ActivityDescriptor::new(ActivityId::new("test", "First"))
        }
        fn execute<'a>(
            &'a self,
            _ctx: RunContext<'a>,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send + 'a>>
        {
            Box::pin(async move {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    struct Second {
        dep: crate::activity::Injected<First>,
        order: Arc<AtomicUsize>,
    }
    impl Activity for Second {
        fn descriptor(&self) -> crate::activity::ActivityDescriptor {
            crate::activity::ActivityDescriptor::new(ActivityId::new("test", "Second"))
                .depends_on(&self.dep)
        }
        fn execute<'a>(
            &'a self,
            _ctx: RunContext<'a>,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send + 'a>>
        {
            Box::pin(async move {
                assert!(self.dep.is_set());
                self.order.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn linear_dependency_runs_in_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut orchestrator = Orchestrator::new(None, FactoryRegistry::new());
        orchestrator.add_activity(First(counter.clone()));
        let dep = crate::activity::Injected::new();
        orchestrator.add_activity(Second {
            dep,
            order: counter.clone(),
        });

        let token = CancellationToken::new();
        orchestrator.execute(&token).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        let results = orchestrator.all_results();
        assert!(results.values().all(|r| r.is_success()));
    }

    #[tokio::test]
    async fn duplicate_activity_id_fails_wiring() {
        let mut orchestrator = Orchestrator::new(None, FactoryRegistry::new());
        orchestrator.add_activity(First(Arc::new(AtomicUsize::new(0))));
        orchestrator.add_activity(First(Arc::new(AtomicUsize::new(0))));
        let token = CancellationToken::new();
        let err = orchestrator.execute(&token).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateActivityId(_)));
    }

    /// An anonymous, ordering-only dependency via `.after::<T>()`: `After`
    /// has no field referencing `First`'s instance at all, so there is
    /// nothing for the body to read — but the orchestrator still must not
    /// start `After` until `First` has finished (B4).
    struct After {
        order: Arc<AtomicUsize>,
        observed: Arc<Mutex<usize>>,
    }
    impl Activity for After {
        fn descriptor(&self) -> crate::activity::ActivityDescriptor {
            crate::activity::ActivityDescriptor::new(ActivityId::new("test", "After")).after::<First>()
        }
        fn execute<'a>(
            &'a self,
            _ctx: RunContext<'a>,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send + 'a>>
        {
            Box::pin(async move {
                *self.observed.lock() = self.order.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn anonymous_dependency_enforces_ordering_without_body_access() {
        let counter = Arc::new(AtomicUsize::new(0));
        let observed = Arc::new(Mutex::new(usize::MAX));
        let mut orchestrator = Orchestrator::new(None, FactoryRegistry::new());
        orchestrator.add_activity(First(counter.clone()));
        orchestrator.add_activity(After {
            order: counter.clone(),
            observed: observed.clone(),
        });

        let token = CancellationToken::new();
        orchestrator.execute(&token).await.unwrap();

        // `After` ran strictly after `First`'s increment, even though it
        // holds no handle to `First`'s instance.
        assert_eq!(*observed.lock(), 1);
    }

    struct Failing;
    impl Activity for Failing {
        fn descriptor(&self) -> crate::activity::ActivityDescriptor {
            crate::activity::ActivityDescriptor::new(ActivityId::new("test", "Failing"))
        }
        fn execute<'a>(
            &'a self,
            _ctx: RunContext<'a>,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send + 'a>>
        {
            Box::pin(async move { Err("boom".to_string()) })
        }
    }

    struct DependsOnFailing {
        dep: crate::activity::Injected<Failing>,
        ran: Arc<AtomicUsize>,
    }
    impl Activity for DependsOnFailing {
        fn descriptor(&self) -> crate::activity::ActivityDescriptor {
            crate::activity::ActivityDescriptor::new(ActivityId::new("test", "DependsOnFailing"))
                .depends_on(&self.dep)
        }
        fn execute<'a>(
            &'a self,
            _ctx: RunContext<'a>,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send + 'a>>
        {
            Box::pin(async move {
                self.ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn dependency_failure_skips_transitive_dependents_with_nil_error() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut orchestrator = Orchestrator::new(None, FactoryRegistry::new());
        orchestrator.add_activity(Failing);
        let dep = crate::activity::Injected::new();
        orchestrator.add_activity(DependsOnFailing {
            dep,
            ran: ran.clone(),
        });

        let token = CancellationToken::new();
        let err = orchestrator.execute(&token).await.unwrap_err();
        assert!(err.to_string().contains("boom"));

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        let results = orchestrator.all_results();
        let failing = results.get(&ActivityId::new("test", "Failing")).unwrap();
        assert!(failing.state == pbsflow_common::ActivityState::Completed && failing.error.is_some());
        let dependent = results.get(&ActivityId::new("test", "DependsOnFailing")).unwrap();
        assert_eq!(dependent.state, pbsflow_common::ActivityState::Skipped);
        assert!(dependent.error.is_none());
    }
}
