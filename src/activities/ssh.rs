//! SSH client used for the graceful PBS shutdown (SPEC_FULL.md component 14).
//!
//! `ssh2` is blocking; every call is pushed onto a blocking thread with
//! `spawn_blocking` so it never stalls the async runtime.

use std::io::Read;
use std::net::TcpStream;
use std::time::Duration;

use ssh2::Session;

#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Clone, Default)]
pub struct SshClient;

impl SshClient {
    pub fn new() -> Self {
        Self
    }

    /// Runs `command` on `target` over a fresh SSH session, returning its
    /// combined stdout. Fails if the remote command exits non-zero.
    pub async fn run_command(&self, target: &SshTarget, command: &str) -> Result<String, String> {
        let target = target.clone();
        let command = command.to_string();
        tokio::task::spawn_blocking(move || run_blocking(&target, &command))
            .await
            .map_err(|e| format!("ssh task panicked: {e}"))?
    }
}

fn run_blocking(target: &SshTarget, command: &str) -> Result<String, String> {
    let tcp = TcpStream::connect((target.host.as_str(), target.port))
        .map_err(|e| format!("tcp connect to {}:{} failed: {e}", target.host, target.port))?;
    tcp.set_read_timeout(Some(Duration::from_secs(30)))
        .map_err(|e| format!("failed to set read timeout: {e}"))?;

    let mut session = Session::new().map_err(|e| format!("ssh session init failed: {e}"))?;
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|e| format!("ssh handshake failed: {e}"))?;

    match (&target.password, &target.key_path) {
        (Some(password), _) => session
            .userauth_password(&target.user, password)
            .map_err(|e| format!("ssh password auth failed: {e}"))?,
        (None, Some(key_path)) => session
            .userauth_pubkey_file(&target.user, None, std::path::Path::new(key_path), None)
            .map_err(|e| format!("ssh key auth failed: {e}"))?,
        (None, None) => return Err("no ssh credentials configured (need password or key_path)".to_string()),
    }

    if !session.authenticated() {
        return Err("ssh authentication did not complete".to_string());
    }

    let mut channel = session.channel_session().map_err(|e| format!("ssh channel open failed: {e}"))?;
    channel.exec(command).map_err(|e| format!("ssh exec failed: {e}"))?;

    let mut output = String::new();
    channel
        .read_to_string(&mut output)
        .map_err(|e| format!("ssh read failed: {e}"))?;
    channel.wait_close().map_err(|e| format!("ssh wait_close failed: {e}"))?;

    let status = channel.exit_status().map_err(|e| format!("ssh exit_status failed: {e}"))?;
    if status != 0 {
        return Err(format!("remote command '{command}' exited with {status}: {output}"));
    }
    Ok(output)
}
