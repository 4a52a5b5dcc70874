//! Workflow composition (§4.3).

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::activity::ActivityId;
use pbsflow_common::ActivityResult;

/// A runnable unit: the orchestrator implements this directly; [`compose`]
/// builds a composite that runs several in sequence.
#[async_trait]
pub trait Workflow: Send + Sync {
    async fn execute(&mut self, ctx: &CancellationToken) -> Result<(), anyhow::Error>;
    fn all_results(&self) -> HashMap<ActivityId, ActivityResult>;
}

#[async_trait]
impl Workflow for crate::orchestrator::Orchestrator {
    async fn execute(&mut self, ctx: &CancellationToken) -> Result<(), anyhow::Error> {
        crate::orchestrator::Orchestrator::execute(self, ctx)
            .await
            .map_err(anyhow::Error::from)
    }

    fn all_results(&self) -> HashMap<ActivityId, ActivityResult> {
        crate::orchestrator::Orchestrator::all_results(self)
    }
}

/// Runs `workflows` sequentially, regardless of earlier failures, and
/// returns a composite error naming every failed sub-workflow by index.
pub struct Composite {
    workflows: Vec<(String, Box<dyn Workflow>)>,
}

impl Composite {
    pub fn new(workflows: Vec<(String, Box<dyn Workflow>)>) -> Self {
        Self { workflows }
    }
}

#[async_trait]
impl Workflow for Composite {
    async fn execute(&mut self, ctx: &CancellationToken) -> Result<(), anyhow::Error> {
        let mut failures = Vec::new();
        for (idx, (name, workflow)) in self.workflows.iter_mut().enumerate() {
            if let Err(err) = workflow.execute(ctx).await {
                failures.push(format!("[{idx}] {name}: {err}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "{} sub-workflow(s) failed: {}",
                failures.len(),
                failures.join("; ")
            ))
        }
    }

    fn all_results(&self) -> HashMap<ActivityId, ActivityResult> {
        let mut merged = HashMap::new();
        for (_, workflow) in &self.workflows {
            merged.extend(workflow.all_results());
        }
        merged
    }
}

/// Convenience constructor matching the design's `compose(workflows)`.
pub fn compose(workflows: Vec<(String, Box<dyn Workflow>)>) -> Composite {
    Composite::new(workflows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Workflow for Counting {
        async fn execute(&mut self, _ctx: &CancellationToken) -> Result<(), anyhow::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(anyhow::anyhow!("boom"))
            } else {
                Ok(())
            }
        }

        fn all_results(&self) -> HashMap<ActivityId, ActivityResult> {
            HashMap::new()
        }
    }

    #[tokio::test]
    async fn runs_every_sub_workflow_even_after_a_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut composite = compose(vec![
            (
                "first".to_string(),
                Box::new(Counting {
                    calls: calls.clone(),
                    fail: true,
                }),
            ),
            (
                "second".to_string(),
                Box::new(Counting {
                    calls: calls.clone(),
                    fail: false,
                }),
            ),
        ]);

        let token = CancellationToken::new();
        let err = composite.execute(&token).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(err.to_string().contains("first"));
    }
}
