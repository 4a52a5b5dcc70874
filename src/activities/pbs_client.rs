//! Narrow Proxmox Backup Server HTTP client (SPEC_FULL.md component 14).
//!
//! Covers exactly what the two backup-job activities and the power-on
//! reachability poll need: a liveness probe, triggering one named job, and
//! polling its task status to completion. The full PBS API surface is out
//! of scope.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct PbsTarget {
    pub base_url: String,
    pub api_token: String,
    pub accept_invalid_certs: bool,
}

#[derive(Clone)]
pub struct PbsClient {
    http: Client,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct TaskStatus {
    status: String,
    #[serde(default)]
    exitstatus: Option<String>,
}

impl PbsClient {
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .danger_accept_invalid_certs(false)
                .build()
                .expect("reqwest client with default TLS config always builds"),
        }
    }

    fn client_for(&self, target: &PbsTarget) -> Result<Client, String> {
        if !target.accept_invalid_certs {
            return Ok(self.http.clone());
        }
        Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| format!("failed to build insecure PBS client: {e}"))
    }

    fn auth_header(target: &PbsTarget) -> String {
        format!("PBSAPIToken={}", target.api_token)
    }

    /// A short-timeout liveness probe used while polling for the host to
    /// finish booting.
    pub async fn is_reachable(&self, target: &PbsTarget) -> bool {
        let Ok(client) = self.client_for(target) else {
            return false;
        };
        let url = format!("{}/api2/json/version", target.base_url.trim_end_matches('/'));
        client
            .get(url)
            .header("Authorization", Self::auth_header(target))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }

    /// Triggers `job_kind`/`job_id` (e.g. a sync or verify job) and returns
    /// its task UPID.
    pub async fn trigger_job(&self, target: &PbsTarget, job_kind: &str, job_id: &str) -> Result<String, String> {
        let client = self.client_for(target)?;
        let url = format!(
            "{}/api2/json/admin/{job_kind}/{job_id}/run",
            target.base_url.trim_end_matches('/')
        );
        let response = client
            .post(url)
            .header("Authorization", Self::auth_header(target))
            .send()
            .await
            .map_err(|e| format!("failed to trigger PBS job {job_id}: {e}"))?;

        if !response.status().is_success() {
            return Err(format!(
                "PBS rejected job trigger for {job_id}: HTTP {}",
                response.status()
            ));
        }

        let envelope: ApiEnvelope<String> = response
            .json()
            .await
            .map_err(|e| format!("failed to parse PBS job-trigger response for {job_id}: {e}"))?;
        Ok(envelope.data)
    }

    /// Polls a task's status every `poll_interval` until it is no longer
    /// running, up to `timeout`. Returns an error if the task finished with
    /// a non-OK exit status or the timeout elapsed.
    pub async fn wait_for_task(
        &self,
        target: &PbsTarget,
        upid: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<(), String> {
        let client = self.client_for(target)?;
        let url = format!(
            "{}/api2/json/nodes/localhost/tasks/{}/status",
            target.base_url.trim_end_matches('/'),
            urlencoding_upid(upid)
        );

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let response = client
                .get(&url)
                .header("Authorization", Self::auth_header(target))
                .send()
                .await
                .map_err(|e| format!("failed to poll task {upid}: {e}"))?;
            let envelope: ApiEnvelope<TaskStatus> = response
                .json()
                .await
                .map_err(|e| format!("failed to parse task status for {upid}: {e}"))?;

            if envelope.data.status != "running" {
                return match envelope.data.exitstatus.as_deref() {
                    Some("OK") | None => Ok(()),
                    Some(other) => Err(format!("task {upid} finished with status: {other}")),
                };
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(format!("timed out waiting for task {upid} to finish"));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

impl Default for PbsClient {
    fn default() -> Self {
        Self::new()
    }
}

fn urlencoding_upid(upid: &str) -> String {
    upid.replace(':', "%3A")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upid_colons_are_percent_encoded() {
        assert_eq!(urlencoding_upid("UPID:host:1234:abcd"), "UPID%3Ahost%3A1234%3Aabcd");
    }

    #[test]
    fn auth_header_wraps_token() {
        let target = PbsTarget {
            base_url: "https://pbs.lan:8007".to_string(),
            api_token: "user@pbs!token=secret".to_string(),
            accept_invalid_certs: false,
        };
        assert_eq!(PbsClient::auth_header(&target), "PBSAPIToken=user@pbs!token=secret");
    }
}
