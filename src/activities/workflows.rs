//! Builds the two named workflows the run manager is seeded with: `backup`
//! (power-on + the two independent PBS jobs) and `power_off` (the graceful
//! shutdown). Kept separate so either can be reloaded or run alone, per the
//! rationale in §4.3.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::activity::ActivityId;
use crate::config::EngineConfig;
use crate::factory::FactoryRegistry;
use crate::orchestrator::Orchestrator;
use crate::run_manager::WorkflowFactory;
use crate::status::StatusHandler;
use crate::workflow::Workflow;

use super::backup_job::{BackupJob, BackupJobKind, DocumentsJob, MediaJob};
use super::ipmi::IpmiClient;
use super::pbs_client::PbsClient;
use super::power_off::PowerOff;
use super::power_on::PowerOn;
use super::ssh::SshClient;

/// Shared, process-lifetime collaborators injected into every activity
/// across every run. None of these hold a config snapshot themselves — each
/// activity re-reads its own config-tagged fields fresh at wiring time.
#[derive(Clone)]
pub struct Collaborators {
    pub ipmi: IpmiClient,
    pub pbs: PbsClient,
    pub ssh: SshClient,
}

impl Collaborators {
    pub fn new() -> Self {
        Self {
            ipmi: IpmiClient::new(Duration::from_secs(30)),
            pbs: PbsClient::new(),
            ssh: SshClient::new(),
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::new()
    }
}

fn build_backup_orchestrator(
    config: Arc<EngineConfig>,
    collaborators: Collaborators,
    status_handler: StatusHandler,
) -> Orchestrator {
    let mut factories = FactoryRegistry::new();
    factories.shared(collaborators.ipmi);
    factories.shared(collaborators.pbs);

    let mut orchestrator = Orchestrator::new(Some(config.workflow_config.clone()), factories);
    orchestrator
        .add_activity(PowerOn::new(
            status_handler.line_for(ActivityId::new("pbsflow.activities", "PowerOn")),
        ))
        .add_activity(BackupJob::<DocumentsJob>::new(
            status_handler.line_for(ActivityId::new(
                "pbsflow.activities",
                DocumentsJob::ACTIVITY_TYPE,
            )),
        ))
        .add_activity(BackupJob::<MediaJob>::new(status_handler.line_for(ActivityId::new(
            "pbsflow.activities",
            MediaJob::ACTIVITY_TYPE,
        ))));
    orchestrator
}

fn build_power_off_orchestrator(
    config: Arc<EngineConfig>,
    collaborators: Collaborators,
    status_handler: StatusHandler,
) -> Orchestrator {
    let mut factories = FactoryRegistry::new();
    factories.shared(collaborators.ssh);

    let mut orchestrator = Orchestrator::new(Some(config.workflow_config.clone()), factories);
    orchestrator.add_activity(PowerOff::new(
        status_handler.line_for(ActivityId::new("pbsflow.activities", "PowerOff")),
    ));
    orchestrator
}

/// Builds the `name -> WorkflowFactory` map the run manager is constructed
/// with. `config` is captured once, by reference to the live `ArcSwap` —
/// each run's factory call takes a fresh `load_full()` snapshot, so a
/// `/reload` between runs is observed by the *next* run, never by one
/// already in flight (§9 "shared vs fresh dependencies on reload").
pub fn build_workflow_factories(
    config: Arc<ArcSwap<EngineConfig>>,
    collaborators: Collaborators,
) -> HashMap<String, WorkflowFactory> {
    let mut factories: HashMap<String, WorkflowFactory> = HashMap::new();

    let backup_config = config.clone();
    let backup_collaborators = collaborators.clone();
    factories.insert(
        "backup".to_string(),
        Box::new(move |status_handler: StatusHandler| {
            let snapshot = backup_config.load_full();
            Box::new(build_backup_orchestrator(snapshot, backup_collaborators.clone(), status_handler))
                as Box<dyn Workflow>
        }),
    );

    let power_off_config = config.clone();
    let power_off_collaborators = collaborators.clone();
    factories.insert(
        "power_off".to_string(),
        Box::new(move |status_handler: StatusHandler| {
            let snapshot = power_off_config.load_full();
            Box::new(build_power_off_orchestrator(
                snapshot,
                power_off_collaborators.clone(),
                status_handler,
            )) as Box<dyn Workflow>
        }),
    );

    factories
}

/// The fixed pair run by the CLI's one-shot command and the default cron
/// trigger: backup first, power-off regardless of its outcome.
pub const DEFAULT_PIPELINE: &[&str] = &["backup", "power_off"];
