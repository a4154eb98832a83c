use crate::error::{OverseerError, Result};
use crate::logs::{read_last_lines, LogStream};
use crate::service::ServiceId;
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Boundary written into a service log around each process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Started,
    Stopped,
}

impl MarkerKind {
    fn label(self) -> &'static str {
        match self {
            MarkerKind::Started => "started",
            MarkerKind::Stopped => "stopped",
        }
    }
}

/// LogManager owns the per-service log files under one directory.
///
/// Each service has a single combined stdout/stderr file named after its id.
/// The file is opened in append mode for every start, so output survives
/// restarts and is separated by start/stop markers.
#[derive(Debug, Clone)]
pub struct LogManager {
    log_dir: PathBuf,
}

impl LogManager {
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Self {
        Self {
            log_dir: log_dir.as_ref().to_path_buf(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn log_path(&self, id: &ServiceId) -> PathBuf {
        self.log_dir.join(format!("{}.log", id))
    }

    /// Open the service log for appending, creating the directory if needed
    pub fn open_sink(&self, id: &ServiceId) -> Result<File> {
        std::fs::create_dir_all(&self.log_dir).map_err(|e| {
            OverseerError::LogError(format!(
                "Failed to create log directory {}: {}",
                self.log_dir.display(),
                e
            ))
        })?;

        let path = self.log_path(id);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                OverseerError::LogFileError(format!(
                    "Failed to open log file {}: {}",
                    path.display(),
                    e
                ))
            })
    }

    /// Append `=== service <kind>: <timestamp> ===` to the service log
    pub fn write_marker(&self, id: &ServiceId, kind: MarkerKind) -> Result<()> {
        let mut file = self.open_sink(id)?;
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "=== service {}: {} ===", kind.label(), timestamp)
            .map_err(|e| OverseerError::LogError(format!("Failed to write log marker: {}", e)))
    }

    pub async fn read_last_lines(&self, id: &ServiceId, lines: usize) -> Result<Vec<String>> {
        read_last_lines(&self.log_path(id), lines).await
    }

    /// Truncate the service log. A missing file counts as already clear.
    pub fn clear(&self, id: &ServiceId) -> Result<()> {
        let path = self.log_path(id);
        if !path.exists() {
            return Ok(());
        }

        // Truncate in place: a running process keeps appending to the same inode
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .map(|_| ())
            .map_err(|e| {
                OverseerError::LogFileError(format!(
                    "Failed to clear log file {}: {}",
                    path.display(),
                    e
                ))
            })
    }

    /// Tail new output of a service log
    pub async fn follow(&self, id: &ServiceId) -> Result<LogStream> {
        LogStream::follow(self.log_path(id)).await
    }
}
