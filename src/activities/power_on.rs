//! The power-on activity: wakes PBS via IPMI, then polls until it answers
//! HTTP (SPEC_FULL.md component 14).

use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;

use crate::activity::{Activity, ActivityDescriptor, ActivityId, Injected};
use crate::orchestrator::RunContext;
use crate::status::StatusLine;

use super::ipmi::{IpmiClient, IpmiTarget};
use super::pbs_client::{PbsClient, PbsTarget};

#[derive(Debug, Clone, Deserialize)]
pub struct PowerOnConfig {
    pub ipmi_host: String,
    pub ipmi_user: String,
    pub ipmi_password: String,
    pub pbs_url: String,
    pub pbs_api_token: String,
    #[serde(default)]
    pub pbs_accept_invalid_certs: bool,
    #[serde(default = "default_boot_timeout_secs")]
    pub boot_timeout_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_boot_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_secs() -> u64 {
    5
}

pub struct PowerOn {
    config: Injected<PowerOnConfig>,
    ipmi: Injected<IpmiClient>,
    pbs: Injected<PbsClient>,
    status: StatusLine,
}

impl PowerOn {
    pub fn new(status: StatusLine) -> Self {
        Self {
            config: Injected::new(),
            ipmi: Injected::new(),
            pbs: Injected::new(),
            status,
        }
    }
}

impl Activity for PowerOn {
    fn descriptor(&self) -> ActivityDescriptor {
        ActivityDescriptor::new(ActivityId::new("pbsflow.activities", "PowerOn"))
            .config("power_on", &self.config)
            .needs(&self.ipmi)
            .needs(&self.pbs)
    }

    fn init(&self) -> Result<(), String> {
        let config = self.config.get();
        if config.ipmi_host.is_empty() {
            return Err("power_on.ipmi_host must not be empty".to_string());
        }
        if config.pbs_url.is_empty() {
            return Err("power_on.pbs_url must not be empty".to_string());
        }
        Ok(())
    }

    fn execute<'a>(
        &'a self,
        ctx: RunContext<'a>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send + 'a>> {
        Box::pin(async move {
            let config = self.config.get();
            let ipmi_target = IpmiTarget {
                host: config.ipmi_host.clone(),
                user: config.ipmi_user.clone(),
                password: config.ipmi_password.clone(),
            };
            let pbs_target = PbsTarget {
                base_url: config.pbs_url.clone(),
                api_token: config.pbs_api_token.clone(),
                accept_invalid_certs: config.pbs_accept_invalid_certs,
            };

            self.status.set("powering on via IPMI");
            let ipmi_result = self.ipmi.get().power_on(&ipmi_target).await;
            self.status.capture_error("power on failed", || ipmi_result)?;

            self.status.set("waiting for PBS to come online");
            let deadline = tokio::time::Instant::now() + Duration::from_secs(config.boot_timeout_secs);
            loop {
                if self.pbs.get().is_reachable(&pbs_target).await {
                    self.status.set("PBS is online");
                    return Ok(());
                }
                if tokio::time::Instant::now() >= deadline {
                    let message = "timed out waiting for PBS to become reachable".to_string();
                    self.status.set(message.clone());
                    return Err(message);
                }
                tokio::select! {
                    _ = ctx.cancelled() => {
                        return Err("cancelled while waiting for PBS to boot".to_string());
                    }
                    _ = tokio::time::sleep(Duration::from_secs(config.poll_interval_secs)) => {}
                }
            }
        })
    }
}
