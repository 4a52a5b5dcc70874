//! Concrete domain activities for the power-on/backup/power-off pipeline
//! (SPEC_FULL.md component 14). Everything generic — dependency wiring,
//! status lines, log capture — lives upstream of this module; this module
//! is where the engine actually touches IPMI, SSH, and PBS.

pub mod backup_job;
pub mod ipmi;
pub mod pbs_client;
pub mod power_off;
pub mod power_on;
pub mod ssh;
pub mod workflows;

pub use backup_job::{BackupJob, BackupJobConfig, BackupJobKind, DocumentsJob, MediaJob};
pub use ipmi::{IpmiClient, IpmiTarget, PowerState};
pub use pbs_client::{PbsClient, PbsTarget};
pub use power_off::{PowerOff, PowerOffConfig};
pub use power_on::{PowerOn, PowerOnConfig};
pub use ssh::{SshClient, SshTarget};
pub use workflows::{build_workflow_factories, Collaborators, DEFAULT_PIPELINE};
