use crate::config::ProcessSettings;
use crate::error::{OverseerError, Result};
use crate::logs::{LogManager, MarkerKind};
use crate::process::probe::{ProcessMetrics, ProcessProbe};
use crate::process::spawner::{parse_command, spawn_detached, SpawnRequest};
use crate::service::{ServiceRecord, ServiceStatus};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Timing knobs for process control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Grace period between SIGTERM and SIGKILL
    pub stop_timeout: Duration,
    /// How long to wait for the process to vanish after SIGKILL
    pub kill_timeout: Duration,
    /// Pause between the stop and start halves of a restart
    pub restart_settle: Duration,
    /// Liveness polling period while waiting for an exit
    pub poll_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from(&ProcessSettings::default())
    }
}

impl From<&ProcessSettings> for ControllerConfig {
    fn from(settings: &ProcessSettings) -> Self {
        Self {
            stop_timeout: Duration::from_secs(settings.stop_timeout),
            kill_timeout: Duration::from_secs(settings.kill_timeout),
            restart_settle: Duration::from_millis(settings.restart_settle_ms),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Drives OS processes on behalf of service records.
///
/// Every operation mutates the record it is handed but never persists it;
/// callers own the write-back. Operations report success as `bool` and
/// never return errors: spawn problems leave the record FAILED and signal
/// problems leave it unchanged.
pub struct ProcessController {
    config: ControllerConfig,
    logs: LogManager,
    probe: ProcessProbe,
}

impl ProcessController {
    pub fn new(config: ControllerConfig, logs: LogManager) -> Self {
        Self {
            config,
            logs,
            probe: ProcessProbe::new(),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn logs(&self) -> &LogManager {
        &self.logs
    }

    /// Launch the service process.
    ///
    /// Returns false when a live process is already attached or the spawn
    /// failed; in the latter case the record is FAILED.
    pub async fn start(&self, record: &mut ServiceRecord) -> bool {
        if let Some(pid) = record.pid {
            if self.is_alive(pid) {
                tracing::debug!(service = %record.name, pid, "already running");
                return false;
            }
        }

        match self.try_start(record) {
            Ok(pid) => {
                record.attach_pid(pid);
                tracing::info!(service = %record.name, pid, "service started");
                true
            }
            Err(e) => {
                tracing::error!(service = %record.name, error = %e, "failed to start service");
                record.set_status(ServiceStatus::Failed);
                false
            }
        }
    }

    fn try_start(&self, record: &ServiceRecord) -> Result<u32> {
        let argv = parse_command(&record.command)?;
        let log_file = self.logs.open_sink(&record.id)?;
        self.logs.write_marker(&record.id, MarkerKind::Started)?;

        spawn_detached(SpawnRequest {
            name: &record.name,
            argv,
            working_directory: &record.working_directory,
            environment: &record.environment,
            log_file,
        })
    }

    /// Terminate the service process.
    ///
    /// Graceful stops send SIGTERM and escalate to SIGKILL after the stop
    /// timeout; `force` goes straight to SIGKILL. Returns true once no
    /// process is attached, including when there was none to begin with.
    pub async fn stop(&self, record: &mut ServiceRecord, force: bool) -> bool {
        let Some(pid) = record.pid else {
            record.set_status(ServiceStatus::Stopped);
            return true;
        };

        if !self.is_alive(pid) {
            tracing::debug!(service = %record.name, pid, "process already gone");
            record.clear_pid();
            return true;
        }

        if !force {
            tracing::info!(service = %record.name, pid, "stopping gracefully with SIGTERM");
            match send_signal(pid, StopSignal::Terminate) {
                Ok(()) => {
                    // A stopped process only acts on SIGTERM once continued
                    if record.status == ServiceStatus::Paused {
                        if let Err(e) = send_signal(pid, StopSignal::Continue) {
                            tracing::debug!(
                                service = %record.name,
                                pid,
                                error = %e,
                                "SIGCONT after SIGTERM failed"
                            );
                        }
                    }
                    if self.wait_for_exit(pid, self.config.stop_timeout).await {
                        self.finish_stop(record);
                        return true;
                    }
                    tracing::warn!(
                        service = %record.name,
                        pid,
                        timeout = ?self.config.stop_timeout,
                        "did not exit in time, sending SIGKILL"
                    );
                }
                Err(e) => {
                    tracing::warn!(service = %record.name, pid, error = %e, "SIGTERM failed");
                }
            }
        } else {
            tracing::info!(service = %record.name, pid, "force stopping with SIGKILL");
        }

        if let Err(e) = send_signal(pid, StopSignal::Kill) {
            if self.is_alive(pid) {
                tracing::error!(service = %record.name, pid, error = %e, "SIGKILL failed");
                return false;
            }
        }

        if self.wait_for_exit(pid, self.config.kill_timeout).await {
            self.finish_stop(record);
            true
        } else {
            let err = OverseerError::StopError(
                record.name.clone(),
                format!("process {} survived SIGKILL", pid),
            );
            tracing::error!(error = %err, "failed to stop service");
            false
        }
    }

    fn finish_stop(&self, record: &mut ServiceRecord) {
        record.clear_pid();
        if let Err(e) = self.logs.write_marker(&record.id, MarkerKind::Stopped) {
            tracing::warn!(service = %record.name, error = %e, "failed to write stop marker");
        }
        tracing::info!(service = %record.name, "service stopped");
    }

    /// Stop, wait for the settle delay, then start. Leaves `restart_count`
    /// untouched.
    pub async fn restart(&self, record: &mut ServiceRecord, force: bool) -> bool {
        if !self.stop(record, force).await {
            return false;
        }

        sleep(self.config.restart_settle).await;
        self.start(record).await
    }

    /// Suspend the process with SIGSTOP
    pub async fn pause(&self, record: &mut ServiceRecord) -> bool {
        self.suspend_or_continue(record, StopSignal::Stop, ServiceStatus::Paused)
    }

    /// Continue a suspended process with SIGCONT
    pub async fn resume(&self, record: &mut ServiceRecord) -> bool {
        self.suspend_or_continue(record, StopSignal::Continue, ServiceStatus::Running)
    }

    fn suspend_or_continue(
        &self,
        record: &mut ServiceRecord,
        signal: StopSignal,
        target: ServiceStatus,
    ) -> bool {
        let Some(pid) = record.pid else {
            return false;
        };

        if !self.is_alive(pid) {
            record.clear_pid();
            return false;
        }

        match send_signal(pid, signal) {
            Ok(()) => {
                record.set_status(target);
                tracing::info!(service = %record.name, pid, status = %target, "signal delivered");
                true
            }
            Err(e) => {
                tracing::warn!(service = %record.name, pid, error = %e, "signal failed");
                false
            }
        }
    }

    /// The process exists and is not a zombie
    pub fn is_alive(&self, pid: u32) -> bool {
        self.probe.is_alive(pid)
    }

    /// Resource usage of the attached process, if it is alive
    pub fn inspect(&self, record: &ServiceRecord) -> Option<ProcessMetrics> {
        record.pid.and_then(|pid| self.probe.snapshot(pid))
    }

    async fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_alive(pid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(self.config.poll_interval).await;
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum StopSignal {
    Terminate,
    Kill,
    Stop,
    Continue,
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: StopSignal) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let nix_signal = match signal {
        StopSignal::Terminate => Signal::SIGTERM,
        StopSignal::Kill => Signal::SIGKILL,
        StopSignal::Stop => Signal::SIGSTOP,
        StopSignal::Continue => Signal::SIGCONT,
    };
    let raw = i32::try_from(pid)
        .map_err(|_| OverseerError::SignalError(format!("Invalid pid: {}", pid)))?;

    kill(Pid::from_raw(raw), nix_signal).map_err(|e| {
        OverseerError::SignalError(format!("Failed to send {} to {}: {}", nix_signal, pid, e))
    })
}

#[cfg(not(unix))]
fn send_signal(pid: u32, signal: StopSignal) -> Result<()> {
    Err(OverseerError::SignalError(format!(
        "Sending {:?} to {} is not supported on this platform",
        signal, pid
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceId;
    use tempfile::TempDir;

    fn controller(temp_dir: &TempDir) -> ProcessController {
        let config = ControllerConfig {
            stop_timeout: Duration::from_secs(1),
            kill_timeout: Duration::from_secs(2),
            restart_settle: Duration::from_millis(50),
            poll_interval: Duration::from_millis(20),
        };
        ProcessController::new(config, LogManager::new(temp_dir.path().join("logs")))
    }

    fn record(temp_dir: &TempDir, command: &str) -> ServiceRecord {
        ServiceRecord::new(
            ServiceId::generate(),
            "test-service".to_string(),
            command.to_string(),
            temp_dir.path().to_path_buf(),
        )
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);
        let mut record = record(&temp_dir, "sleep 30");

        assert!(controller.start(&mut record).await);
        assert_eq!(record.status, ServiceStatus::Running);
        let pid = record.pid.expect("pid attached");
        assert!(controller.is_alive(pid));

        assert!(controller.stop(&mut record, false).await);
        assert_eq!(record.status, ServiceStatus::Stopped);
        assert!(record.pid.is_none());
        assert!(!controller.is_alive(pid));

        let log = std::fs::read_to_string(controller.logs().log_path(&record.id)).unwrap();
        assert!(log.contains("=== service started: "));
        assert!(log.contains("=== service stopped: "));
    }

    #[tokio::test]
    async fn test_start_when_running_returns_false() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);
        let mut record = record(&temp_dir, "sleep 30");

        assert!(controller.start(&mut record).await);
        let pid = record.pid;
        assert!(!controller.start(&mut record).await);
        assert_eq!(record.pid, pid);

        controller.stop(&mut record, true).await;
    }

    #[tokio::test]
    async fn test_start_invalid_command_marks_failed() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);

        let mut missing = record(&temp_dir, "/nonexistent/binary --flag");
        assert!(!controller.start(&mut missing).await);
        assert_eq!(missing.status, ServiceStatus::Failed);
        assert!(missing.pid.is_none());

        let mut unbalanced = record(&temp_dir, "echo 'unbalanced");
        assert!(!controller.start(&mut unbalanced).await);
        assert_eq!(unbalanced.status, ServiceStatus::Failed);
    }

    #[tokio::test]
    async fn test_stop_without_process_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);
        let mut record = record(&temp_dir, "sleep 30");

        assert!(controller.stop(&mut record, false).await);
        assert!(controller.stop(&mut record, false).await);
        assert_eq!(record.status, ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_stop_escalates_to_sigkill() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);
        let mut record = record(
            &temp_dir,
            "sh -c 'trap \"\" TERM; while true; do sleep 0.1; done'",
        );

        assert!(controller.start(&mut record).await);
        let pid = record.pid.unwrap();
        // Give the shell time to install its trap
        sleep(Duration::from_millis(200)).await;

        assert!(controller.stop(&mut record, false).await);
        assert!(!controller.is_alive(pid));
        assert_eq!(record.status, ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_force_stop() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);
        let mut record = record(&temp_dir, "sleep 30");

        assert!(controller.start(&mut record).await);
        let pid = record.pid.unwrap();
        assert!(controller.stop(&mut record, true).await);
        assert!(!controller.is_alive(pid));
    }

    #[tokio::test]
    async fn test_pause_and_resume_keep_pid() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);
        let mut record = record(&temp_dir, "sleep 30");

        assert!(controller.start(&mut record).await);
        let pid = record.pid;

        assert!(controller.pause(&mut record).await);
        assert_eq!(record.status, ServiceStatus::Paused);
        assert_eq!(record.pid, pid);

        assert!(controller.resume(&mut record).await);
        assert_eq!(record.status, ServiceStatus::Running);
        assert_eq!(record.pid, pid);
        assert_eq!(record.restart_count, 0);

        // Stopping a paused process still works
        assert!(controller.pause(&mut record).await);
        assert!(controller.stop(&mut record, false).await);
        assert!(record.pid.is_none());
    }

    #[tokio::test]
    async fn test_graceful_stop_of_paused_process() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);
        let mut record = record(&temp_dir, "sleep 30");

        assert!(controller.start(&mut record).await);
        let pid = record.pid.expect("pid attached");
        assert!(controller.pause(&mut record).await);

        // Continued after SIGTERM, so no SIGKILL escalation is needed
        let started = std::time::Instant::now();
        assert!(controller.stop(&mut record, false).await);
        assert!(started.elapsed() < controller.config().stop_timeout);
        assert!(!controller.is_alive(pid));
        assert_eq!(record.status, ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_pause_without_process() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);
        let mut record = record(&temp_dir, "sleep 30");

        assert!(!controller.pause(&mut record).await);
        assert!(!controller.resume(&mut record).await);

        assert!(controller.start(&mut record).await);
        controller.stop(&mut record, true).await;
        record.pid = Some(u32::MAX / 2);
        record.status = ServiceStatus::Running;
        assert!(!controller.pause(&mut record).await);
        assert_eq!(record.status, ServiceStatus::Stopped);
        assert!(record.pid.is_none());
    }

    #[tokio::test]
    async fn test_restart_replaces_process() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);
        let mut record = record(&temp_dir, "sleep 30");

        assert!(controller.start(&mut record).await);
        let old_pid = record.pid.unwrap();

        assert!(controller.restart(&mut record, false).await);
        let new_pid = record.pid.unwrap();
        assert_ne!(old_pid, new_pid);
        assert!(!controller.is_alive(old_pid));
        assert!(controller.is_alive(new_pid));
        assert_eq!(record.restart_count, 0);

        controller.stop(&mut record, true).await;
    }

    #[tokio::test]
    async fn test_inspect() {
        let temp_dir = TempDir::new().unwrap();
        let controller = controller(&temp_dir);
        let mut record = record(&temp_dir, "sleep 30");

        assert!(controller.inspect(&record).is_none());

        assert!(controller.start(&mut record).await);
        let metrics = controller.inspect(&record).expect("metrics for live process");
        assert_eq!(Some(metrics.pid), record.pid);

        controller.stop(&mut record, true).await;
        assert!(controller.inspect(&record).is_none());
    }
}
