//! The power-off activity: a graceful remote shutdown over SSH
//! (SPEC_FULL.md component 14). Runs as its own single-activity workflow so
//! it still fires even when the backup workflow it follows failed (§4.3's
//! "always run as a pair" composition).

use std::pin::Pin;

use serde::Deserialize;

use crate::activity::{Activity, ActivityDescriptor, ActivityId, Injected};
use crate::orchestrator::RunContext;
use crate::status::StatusLine;

use super::ssh::{SshClient, SshTarget};

#[derive(Debug, Clone, Deserialize)]
pub struct PowerOffConfig {
    pub ssh_host: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    pub ssh_user: String,
    #[serde(default)]
    pub ssh_password: Option<String>,
    #[serde(default)]
    pub ssh_key_path: Option<String>,
    #[serde(default = "default_shutdown_command")]
    pub shutdown_command: String,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_shutdown_command() -> String {
    "shutdown -h now".to_string()
}

pub struct PowerOff {
    config: Injected<PowerOffConfig>,
    ssh: Injected<SshClient>,
    status: StatusLine,
}

impl PowerOff {
    pub fn new(status: StatusLine) -> Self {
        Self {
            config: Injected::new(),
            ssh: Injected::new(),
            status,
        }
    }
}

impl Activity for PowerOff {
    fn descriptor(&self) -> ActivityDescriptor {
        ActivityDescriptor::new(ActivityId::new("pbsflow.activities", "PowerOff"))
            .config("power_off", &self.config)
            .needs(&self.ssh)
    }

    fn init(&self) -> Result<(), String> {
        let config = self.config.get();
        if config.ssh_host.is_empty() {
            return Err("power_off.ssh_host must not be empty".to_string());
        }
        if config.ssh_password.is_none() && config.ssh_key_path.is_none() {
            return Err("power_off needs either ssh_password or ssh_key_path configured".to_string());
        }
        Ok(())
    }

    fn execute<'a>(
        &'a self,
        _ctx: RunContext<'a>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send + 'a>> {
        Box::pin(async move {
            let config = self.config.get();
            let target = SshTarget {
                host: config.ssh_host.clone(),
                port: config.ssh_port,
                user: config.ssh_user.clone(),
                password: config.ssh_password.clone(),
                key_path: config.ssh_key_path.clone(),
            };

            self.status.set("sending graceful shutdown over SSH");
            let result = self.ssh.get().run_command(&target, &config.shutdown_command).await;
            self.status.capture_error("shutdown command failed", || result)?;
            self.status.set("shutdown command sent");
            Ok(())
        })
    }
}
