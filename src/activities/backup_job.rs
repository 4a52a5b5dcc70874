//! The two backup-job activities (SPEC_FULL.md component 14): independent
//! PBS jobs, both gated on [`PowerOn`](super::power_on::PowerOn) having
//! succeeded. Modeled as one generic activity parameterized by a
//! [`BackupJobKind`] marker so each job gets its own `TypeId` — and hence
//! its own [`ActivityId`] and dependency slot — while sharing one body.

use std::marker::PhantomData;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;

use crate::activity::{Activity, ActivityDescriptor, ActivityId, Injected};
use crate::orchestrator::RunContext;
use crate::status::StatusLine;

use super::pbs_client::{PbsClient, PbsTarget};
use super::power_on::PowerOn;

/// Distinguishes one backup job's identity, config path, and PBS job kind
/// from the other at compile time.
pub trait BackupJobKind: Send + Sync + 'static {
    const ACTIVITY_TYPE: &'static str;
    const CONFIG_PATH: &'static str;
}

pub struct DocumentsJob;
impl BackupJobKind for DocumentsJob {
    const ACTIVITY_TYPE: &'static str = "BackupJobDocuments";
    const CONFIG_PATH: &'static str = "backup_jobs.documents";
}

pub struct MediaJob;
impl BackupJobKind for MediaJob {
    const ACTIVITY_TYPE: &'static str = "BackupJobMedia";
    const CONFIG_PATH: &'static str = "backup_jobs.media";
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupJobConfig {
    pub job_kind: String,
    pub job_id: String,
    pub pbs_url: String,
    pub pbs_api_token: String,
    #[serde(default)]
    pub pbs_accept_invalid_certs: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_job_timeout_secs() -> u64 {
    3600
}

pub struct BackupJob<K: BackupJobKind> {
    config: Injected<BackupJobConfig>,
    pbs: Injected<PbsClient>,
    power_on: Injected<PowerOn>,
    status: StatusLine,
    _kind: PhantomData<K>,
}

impl<K: BackupJobKind> BackupJob<K> {
    pub fn new(status: StatusLine) -> Self {
        Self {
            config: Injected::new(),
            pbs: Injected::new(),
            power_on: Injected::new(),
            status,
            _kind: PhantomData,
        }
    }
}

impl<K: BackupJobKind> Activity for BackupJob<K> {
    fn descriptor(&self) -> ActivityDescriptor {
        ActivityDescriptor::new(ActivityId::new("pbsflow.activities", K::ACTIVITY_TYPE))
            .config(K::CONFIG_PATH, &self.config)
            .needs(&self.pbs)
            .depends_on(&self.power_on)
    }

    fn init(&self) -> Result<(), String> {
        let config = self.config.get();
        if config.job_id.is_empty() {
            return Err(format!("{} must not be empty", K::CONFIG_PATH));
        }
        Ok(())
    }

    fn execute<'a>(
        &'a self,
        _ctx: RunContext<'a>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send + 'a>> {
        Box::pin(async move {
            let config = self.config.get();
            let target = PbsTarget {
                base_url: config.pbs_url.clone(),
                api_token: config.pbs_api_token.clone(),
                accept_invalid_certs: config.pbs_accept_invalid_certs,
            };

            self.status.set(format!("triggering {} job", config.job_id));
            let upid = self
                .pbs
                .get()
                .trigger_job(&target, &config.job_kind, &config.job_id)
                .await
                .map_err(|e| {
                    self.status.set(format!("trigger failed: {e}"));
                    e
                })?;

            self.status.set(format!("waiting for {upid} to finish"));
            self.pbs
                .get()
                .wait_for_task(
                    &target,
                    &upid,
                    Duration::from_secs(config.poll_interval_secs),
                    Duration::from_secs(config.job_timeout_secs),
                )
                .await
                .map_err(|e| {
                    self.status.set(format!("job failed: {e}"));
                    e
                })?;

            self.status.set("completed");
            Ok(())
        })
    }
}
