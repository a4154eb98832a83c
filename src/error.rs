use thiserror::Error;

/// Main error type for the overseer supervisor
#[derive(Debug, Error)]
pub enum OverseerError {
    // Service lookup and validation errors
    #[error("Service not found: {0}")]
    NotFound(String),

    #[error("Service name already exists: {0}")]
    DuplicateName(String),

    #[error("Invalid service name: {0}")]
    InvalidName(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    // Process control errors
    #[error("Failed to spawn process: {0}")]
    SpawnError(String),

    #[error("Signal error: {0}")]
    SignalError(String),

    #[error("Failed to stop process {0}: {1}")]
    StopError(String, String),

    // State store errors
    #[error("State store error: {0}")]
    StateError(String),

    #[error("Failed to load state: {0}")]
    StateLoadError(String),

    #[error("Failed to save state: {0}")]
    StateSaveError(String),

    #[error("State corruption detected: {0}")]
    StateCorruption(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // Log-related errors
    #[error("Log error: {0}")]
    LogError(String),

    #[error("Failed to open log file: {0}")]
    LogFileError(String),

    // Daemon errors
    #[error("Daemon not running")]
    DaemonNotRunning,

    #[error("Daemon already running (PID: {0})")]
    DaemonAlreadyRunning(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for overseer operations
pub type Result<T> = std::result::Result<T, OverseerError>;
