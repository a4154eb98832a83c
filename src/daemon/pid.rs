use crate::error::{OverseerError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// PID file of the background daemon
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Record the current process id, creating the parent directory if needed
    pub fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                OverseerError::StateError(format!("Failed to create PID directory: {}", e))
            })?;
        }

        fs::write(&self.path, std::process::id().to_string())
            .map_err(|e| OverseerError::StateError(format!("Failed to write PID file: {}", e)))
    }

    pub fn read(&self) -> Result<u32> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| OverseerError::StateError(format!("Failed to read PID file: {}", e)))?;

        content
            .trim()
            .parse::<u32>()
            .map_err(|e| OverseerError::StateError(format!("Invalid PID in file: {}", e)))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OverseerError::StateError(format!(
                "Failed to remove PID file: {}",
                e
            ))),
        }
    }

    /// PID of the recorded daemon if that process is still alive
    pub fn running_pid(&self) -> Option<u32> {
        let pid = self.read().ok()?;
        is_process_alive(pid).then_some(pid)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM))
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}
