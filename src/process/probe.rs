use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

/// Point-in-time view of a live process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetrics {
    pub pid: u32,
    /// OS scheduler state (e.g. "Sleeping", "Stopped")
    pub status: String,
    pub cpu_percent: f32,
    /// Resident set size in bytes
    pub memory_rss: u64,
    /// Virtual memory size in bytes
    pub memory_virtual: u64,
    pub started_at: DateTime<Utc>,
}

impl ProcessMetrics {
    /// Time elapsed since the process was created
    pub fn uptime(&self) -> Duration {
        (Utc::now() - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Liveness and resource probe backed by sysinfo.
///
/// The `System` is kept between calls so CPU usage is measured against the
/// previous refresh instead of always reading zero.
pub struct ProcessProbe {
    system: Mutex<System>,
}

impl ProcessProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    /// Whether the OS still schedules `pid`: it exists and is not a zombie
    pub fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 || !signal_probe(pid) {
            return false;
        }

        let sys_pid = Pid::from_u32(pid);
        let mut system = self.lock();
        refresh(&mut system, sys_pid);

        match system.process(sys_pid) {
            Some(process) => !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
            // Exists per kill(0) but hidden from us; trust the signal probe
            None => true,
        }
    }

    /// Collect metrics for `pid`, or `None` when it is not alive
    pub fn snapshot(&self, pid: u32) -> Option<ProcessMetrics> {
        if pid == 0 {
            return None;
        }

        let sys_pid = Pid::from_u32(pid);
        let mut system = self.lock();
        refresh(&mut system, sys_pid);

        let process = system.process(sys_pid)?;
        let status = process.status();
        if matches!(status, ProcessStatus::Zombie | ProcessStatus::Dead) {
            return None;
        }

        let started_at = Utc
            .timestamp_opt(process.start_time() as i64, 0)
            .single()
            .unwrap_or_else(Utc::now);

        Some(ProcessMetrics {
            pid,
            status: status.to_string(),
            cpu_percent: process.cpu_usage(),
            memory_rss: process.memory(),
            memory_virtual: process.virtual_memory(),
            started_at,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, System> {
        self.system.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ProcessProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn refresh(system: &mut System, pid: Pid) {
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::everything(),
    );
}

/// Signal 0 existence check; EPERM still means the process exists
#[cfg(unix)]
fn signal_probe(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid as NixPid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };

    match kill(NixPid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn signal_probe(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_is_alive() {
        let probe = ProcessProbe::new();

        let mut child = Command::new("/bin/sleep")
            .arg("5")
            .spawn()
            .expect("Failed to spawn process");
        let pid = child.id().expect("Failed to get PID");

        assert!(probe.is_alive(pid));

        child.kill().await.expect("Failed to kill process");
        let _ = child.wait().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!probe.is_alive(pid));
    }

    #[test]
    fn test_zombie_is_not_alive() {
        let probe = ProcessProbe::new();

        // std child, never waited on, so it lingers as a zombie after exit
        let child = std::process::Command::new("/bin/sh")
            .arg("-c")
            .arg("exit 0")
            .spawn()
            .expect("Failed to spawn process");
        let pid = child.id();
        std::thread::sleep(Duration::from_millis(300));

        assert!(!probe.is_alive(pid));
        assert!(probe.snapshot(pid).is_none());
        drop(child);
    }

    #[test]
    fn test_pid_zero_is_never_alive() {
        let probe = ProcessProbe::new();
        assert!(!probe.is_alive(0));
        assert!(probe.snapshot(0).is_none());
    }

    #[tokio::test]
    async fn test_snapshot() {
        let probe = ProcessProbe::new();

        let mut child = Command::new("/bin/sleep")
            .arg("5")
            .spawn()
            .expect("Failed to spawn process");
        let pid = child.id().expect("Failed to get PID");

        let metrics = probe.snapshot(pid).expect("process should be alive");
        assert_eq!(metrics.pid, pid);
        assert!(metrics.memory_rss > 0);
        assert!(metrics.uptime() < Duration::from_secs(60));

        let _ = child.kill().await;
        let _ = child.wait().await;
    }
}
