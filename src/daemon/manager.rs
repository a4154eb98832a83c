use super::pid::PidFile;
use crate::error::{OverseerError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::time::{sleep, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Snapshot of the daemon's state as seen from its PID file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub pid_file: PathBuf,
}

/// Start, stop and query the background daemon through its PID file
#[derive(Debug, Clone)]
pub struct DaemonManager {
    pid_file: PidFile,
}

impl DaemonManager {
    pub fn new(pid_file: PidFile) -> Self {
        Self { pid_file }
    }

    pub fn is_running(&self) -> bool {
        self.pid_file.running_pid().is_some()
    }

    pub fn get_pid(&self) -> Option<u32> {
        self.pid_file.running_pid()
    }

    /// Claim the PID file for the current process (called by the daemon)
    pub fn register_daemon(&self) -> Result<()> {
        if let Some(pid) = self.pid_file.running_pid() {
            if pid != std::process::id() {
                return Err(OverseerError::DaemonAlreadyRunning(pid));
            }
        }

        // Whatever is left over belongs to a dead daemon
        self.pid_file.remove()?;
        self.pid_file.write()
    }

    /// Release the PID file if it still names the current process
    pub fn unregister_daemon(&self) -> Result<()> {
        match self.pid_file.read() {
            Ok(pid) if pid != std::process::id() => Ok(()),
            _ => self.pid_file.remove(),
        }
    }

    /// Launch `program` as a detached daemon and wait until it registers.
    ///
    /// `program` is expected to daemonize itself when given `--daemonize`.
    pub async fn start_daemon(
        &self,
        program: &Path,
        config_path: Option<&Path>,
        timeout: Duration,
    ) -> Result<u32> {
        if let Some(pid) = self.get_pid() {
            return Err(OverseerError::DaemonAlreadyRunning(pid));
        }

        let mut command = tokio::process::Command::new(program);
        command.arg("--daemonize");
        if let Some(path) = config_path {
            command.arg("--config").arg(path);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = command.spawn().map_err(|e| {
            OverseerError::SpawnError(format!(
                "Failed to launch daemon {}: {}",
                program.display(),
                e
            ))
        })?;
        // The launcher exits right after forking the real daemon
        let launcher = child.wait().await?;
        if !launcher.success() {
            return Err(OverseerError::SpawnError(format!(
                "Daemon launcher exited with {}",
                launcher
            )));
        }

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(pid) = self.get_pid() {
                tracing::info!(pid, "daemon started");
                return Ok(pid);
            }
            sleep(POLL_INTERVAL).await;
        }

        Err(OverseerError::Other(format!(
            "Daemon did not register within {:?}",
            timeout
        )))
    }

    /// SIGTERM the daemon, escalating to SIGKILL after `timeout`
    #[cfg(unix)]
    pub async fn stop_daemon(&self, timeout: Duration) -> Result<u32> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = self.get_pid().ok_or(OverseerError::DaemonNotRunning)?;
        let nix_pid = Pid::from_raw(pid as i32);

        tracing::info!(pid, "stopping daemon");
        kill(nix_pid, Signal::SIGTERM)
            .map_err(|e| OverseerError::SignalError(format!("Failed to send SIGTERM: {}", e)))?;

        if self.wait_until_stopped(timeout).await {
            self.pid_file.remove()?;
            return Ok(pid);
        }

        tracing::warn!(pid, "daemon did not stop gracefully, sending SIGKILL");
        kill(nix_pid, Signal::SIGKILL)
            .map_err(|e| OverseerError::SignalError(format!("Failed to send SIGKILL: {}", e)))?;

        if self.wait_until_stopped(Duration::from_secs(1)).await {
            self.pid_file.remove()?;
            return Ok(pid);
        }

        Err(OverseerError::Other(
            "Failed to stop daemon even with SIGKILL".to_string(),
        ))
    }

    #[cfg(not(unix))]
    pub async fn stop_daemon(&self, _timeout: Duration) -> Result<u32> {
        Err(OverseerError::Other(
            "Daemon stop is only supported on Unix systems".to_string(),
        ))
    }

    async fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if !self.is_running() {
                return true;
            }
            sleep(POLL_INTERVAL).await;
        }
        !self.is_running()
    }

    pub fn get_status(&self) -> DaemonStatus {
        let pid = self.get_pid();
        DaemonStatus {
            running: pid.is_some(),
            pid,
            pid_file: self.pid_file.path().to_path_buf(),
        }
    }
}
