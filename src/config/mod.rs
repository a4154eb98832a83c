use crate::error::{OverseerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file inside the config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Name of the service database inside the data directory
const SERVICES_DB_NAME: &str = "services.json";

/// Name of the daemon PID file inside the data directory
const PID_FILE_NAME: &str = "overseer.pid";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level supervisor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    /// Defaults applied to newly added services
    #[serde(default)]
    pub services: ServiceDefaults,

    #[serde(default)]
    pub monitor: MonitorSettings,

    #[serde(default)]
    pub process: ProcessSettings,

    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub ui: UiSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Diagnostic log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Defaults used when a service is added without explicit policy values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefaults {
    #[serde(default = "default_auto_restart")]
    pub auto_restart: bool,

    /// Delay before an automatic restart (in seconds)
    #[serde(default = "default_restart_delay")]
    pub restart_delay: u64,

    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,
}

/// Health monitor timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Seconds between two health checks
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Seconds a service may stay in the starting state
    #[serde(default = "default_start_timeout")]
    pub start_timeout: u64,
}

/// Process control timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSettings {
    /// Graceful termination wait before escalating to SIGKILL (in seconds)
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: u64,

    /// Wait after SIGKILL (in seconds)
    #[serde(default = "default_kill_timeout")]
    pub kill_timeout: u64,

    /// Pause between stop and start during a restart (in milliseconds)
    #[serde(default = "default_restart_settle_ms")]
    pub restart_settle_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiSettings {
    #[serde(default = "default_color_output")]
    pub color_output: bool,
}

// Default value functions for serde
fn default_log_level() -> String {
    "info".to_string()
}

fn default_auto_restart() -> bool {
    true
}

fn default_restart_delay() -> u64 {
    5
}

fn default_max_restart_attempts() -> u32 {
    3
}

fn default_check_interval() -> u64 {
    5
}

fn default_start_timeout() -> u64 {
    30
}

fn default_stop_timeout() -> u64 {
    10
}

fn default_kill_timeout() -> u64 {
    5
}

fn default_restart_settle_ms() -> u64 {
    1000
}

fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.data_local_dir().join("overseer"))
        .unwrap_or_else(|| PathBuf::from("/tmp/overseer"))
}

fn default_log_dir() -> PathBuf {
    default_data_dir().join("logs")
}

fn default_color_output() -> bool {
    true
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for ServiceDefaults {
    fn default() -> Self {
        Self {
            auto_restart: default_auto_restart(),
            restart_delay: default_restart_delay(),
            max_restart_attempts: default_max_restart_attempts(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            start_timeout: default_start_timeout(),
        }
    }
}

impl MonitorSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout)
    }
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            stop_timeout: default_stop_timeout(),
            kill_timeout: default_kill_timeout(),
            restart_settle_ms: default_restart_settle_ms(),
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            color_output: default_color_output(),
        }
    }
}

impl Config {
    /// Default location of the configuration file
    pub fn default_path() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("overseer"))
            .unwrap_or_else(|| PathBuf::from("/tmp/overseer"))
            .join(CONFIG_FILE_NAME)
    }

    /// Load configuration from `path`, or from the default location.
    ///
    /// A missing file is created with default contents so operators have
    /// something to edit.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);

        if !path.exists() {
            let config = Config::default();
            config.save(&path)?;
            return Ok(config);
        }

        Self::from_file(&path)
    }

    /// Parse and validate a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Config> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            OverseerError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let mut config = Self::parse(&contents)?;
        config.expand_paths();
        config.validate()?;

        Ok(config)
    }

    /// Parse TOML configuration contents
    pub fn parse(contents: &str) -> Result<Config> {
        toml::from_str(contents)
            .map_err(|e| OverseerError::InvalidConfig(format!("Failed to parse TOML: {}", e)))
    }

    /// Write the configuration as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                OverseerError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| {
            OverseerError::ConfigError(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, contents)
            .map_err(|e| OverseerError::ConfigError(format!("Failed to write config file: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let level = self.general.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(OverseerError::ConfigValidationError(format!(
                "Invalid log_level: {}. Must be one of: {}",
                self.general.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if self.monitor.check_interval == 0 {
            return Err(OverseerError::ConfigValidationError(
                "monitor.check_interval must be at least 1 second".to_string(),
            ));
        }

        if self.monitor.start_timeout == 0 {
            return Err(OverseerError::ConfigValidationError(
                "monitor.start_timeout must be at least 1 second".to_string(),
            ));
        }

        if self.paths.data_dir.as_os_str().is_empty() {
            return Err(OverseerError::ConfigValidationError(
                "paths.data_dir must not be empty".to_string(),
            ));
        }

        if self.paths.log_dir.as_os_str().is_empty() {
            return Err(OverseerError::ConfigValidationError(
                "paths.log_dir must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Path of the persisted service database
    pub fn services_db_path(&self) -> PathBuf {
        self.paths.data_dir.join(SERVICES_DB_NAME)
    }

    /// Path of the daemon PID file
    pub fn pid_file_path(&self) -> PathBuf {
        self.paths.data_dir.join(PID_FILE_NAME)
    }

    /// Configuration rooted entirely inside `dir`, used by tests and
    /// throwaway setups
    pub fn with_root(dir: &Path) -> Config {
        Config {
            paths: PathSettings {
                data_dir: dir.join("data"),
                log_dir: dir.join("logs"),
            },
            ..Config::default()
        }
    }

    fn expand_paths(&mut self) {
        self.paths.data_dir = expand_home(&self.paths.data_dir);
        self.paths.log_dir = expand_home(&self.paths.log_dir);
    }
}

/// Expand a leading `~` against `$HOME`
fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };

    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert!(config.services.auto_restart);
        assert_eq!(config.services.restart_delay, 5);
        assert_eq!(config.services.max_restart_attempts, 3);
        assert_eq!(config.monitor.check_interval(), Duration::from_secs(5));
        assert_eq!(config.monitor.start_timeout(), Duration::from_secs(30));
        assert_eq!(config.process.stop_timeout, 10);
        assert_eq!(config.process.kill_timeout, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
            [services]
            restart_delay = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.services.restart_delay, 1);
        assert!(config.services.auto_restart);
        assert_eq!(config.services.max_restart_attempts, 3);
        assert_eq!(config.monitor.check_interval, 5);
    }

    #[test]
    fn test_parse_invalid_toml() {
        let result = Config::parse("[services\nauto_restart = ");
        assert!(matches!(result, Err(OverseerError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let mut config = Config::default();
        config.general.log_level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(OverseerError::ConfigValidationError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.monitor.check_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_creates_default_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config, Config::default());

        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_expand_home() {
        let Some(home) = std::env::var_os("HOME") else {
            return;
        };
        let expanded = expand_home(Path::new("~/overseer/logs"));
        assert_eq!(expanded, PathBuf::from(home).join("overseer/logs"));
        assert_eq!(expand_home(Path::new("/var/log")), PathBuf::from("/var/log"));
    }

    #[test]
    fn test_derived_paths() {
        let config = Config::with_root(Path::new("/srv/overseer"));
        assert_eq!(
            config.services_db_path(),
            PathBuf::from("/srv/overseer/data/services.json")
        );
        assert_eq!(
            config.pid_file_path(),
            PathBuf::from("/srv/overseer/data/overseer.pid")
        );
        assert_eq!(config.paths.log_dir, PathBuf::from("/srv/overseer/logs"));
    }
}
