//! IPMI out-of-band power control, shelled out to `ipmitool` (SPEC_FULL.md
//! component 14 — a narrow external collaborator, not the hard part).

use std::time::Duration;

use tokio::process::Command;

/// Credentials and address for one IPMI-managed host.
#[derive(Debug, Clone)]
pub struct IpmiTarget {
    pub host: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
    Unknown,
}

/// Thin wrapper around the `ipmitool` binary. Every call is bounded by
/// `timeout`; activities are responsible for their own overall deadline.
#[derive(Clone)]
pub struct IpmiClient {
    timeout: Duration,
}

impl IpmiClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn power_on(&self, target: &IpmiTarget) -> Result<(), String> {
        let output = self.run(target, &["chassis", "power", "on"]).await?;
        if !output.status.success() {
            return Err(format!(
                "ipmitool power on exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }

    pub async fn power_off(&self, target: &IpmiTarget) -> Result<(), String> {
        let output = self.run(target, &["chassis", "power", "off"]).await?;
        if !output.status.success() {
            return Err(format!(
                "ipmitool power off exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }

    pub async fn power_status(&self, target: &IpmiTarget) -> Result<PowerState, String> {
        let output = self.run(target, &["chassis", "power", "status"]).await?;
        if !output.status.success() {
            return Err(format!(
                "ipmitool power status exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        let stdout = String::from_utf8_lossy(&output.stdout).to_lowercase();
        Ok(parse_power_state(&stdout))
    }

    async fn run(&self, target: &IpmiTarget, args: &[&str]) -> Result<std::process::Output, String> {
        let mut command = Command::new("ipmitool");
        command
            .args(["-I", "lanplus", "-H", &target.host, "-U", &target.user, "-P", &target.password])
            .args(args);

        tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| "ipmitool call timed out".to_string())?
            .map_err(|e| format!("failed to spawn ipmitool: {e}"))
    }
}

fn parse_power_state(stdout: &str) -> PowerState {
    if stdout.contains("chassis power is on") {
        PowerState::On
    } else if stdout.contains("chassis power is off") {
        PowerState::Off
    } else {
        PowerState::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_power_on_status_line() {
        assert_eq!(parse_power_state("Chassis Power is on\n"), PowerState::On);
    }

    #[test]
    fn parses_power_off_status_line() {
        assert_eq!(parse_power_state("Chassis Power is off\n"), PowerState::Off);
    }

    #[test]
    fn unrecognized_output_is_unknown() {
        assert_eq!(parse_power_state("some garbage\n"), PowerState::Unknown);
    }
}
