//! Diagnostic logging setup.
//!
//! - [`init_cli`]: stderr only, for one-shot commands
//! - [`init_daemon`]: stderr plus `{log_dir}/overseer.log`
//!
//! `RUST_LOG` takes precedence over the configured level in both modes.

use crate::error::{OverseerError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Name of the daemon's own log file inside the log directory
pub const DAEMON_LOG_FILE: &str = "overseer.log";

/// Keeps the background log writer alive; dropping it flushes the file
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

pub fn init_cli(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Log to stderr and to the daemon log file.
///
/// The file is appended to across daemon runs and never rotated.
pub fn init_daemon(log_dir: &Path, level: &str) -> Result<LoggingGuard> {
    std::fs::create_dir_all(log_dir).map_err(|e| {
        OverseerError::LogError(format!(
            "Failed to create log directory {}: {}",
            log_dir.display(),
            e
        ))
    })?;

    let file_appender = tracing_appender::rolling::never(log_dir, DAEMON_LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking);
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| OverseerError::LogError(format!("Failed to install logger: {}", e)))?;

    Ok(LoggingGuard { _guard: guard })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_daemon_rejects_unusable_log_dir() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        std::fs::write(&file, "").unwrap();

        let result = init_daemon(&file.join("logs"), "info");
        assert!(matches!(result, Err(OverseerError::LogError(_))));
    }
}
