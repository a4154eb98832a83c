// Service module - the persisted unit of supervision

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Opaque service identifier, generated once at creation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(String);

impl ServiceId {
    /// Generate a fresh 8 character identifier
    pub fn generate() -> Self {
        let simple = uuid::Uuid::new_v4().simple().to_string();
        Self(simple[..8].to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Stopped,
    Starting,
    Running,
    Paused,
    Failed,
}

/// Colour used when rendering a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusColor {
    Green,
    Cyan,
    Yellow,
    Red,
    BrightRed,
}

/// Display attributes of a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusStyle {
    pub color: StatusColor,
    pub symbol: &'static str,
    pub bold: bool,
}

impl ServiceStatus {
    /// Whether a process id may be attached in this state
    pub fn holds_process(self) -> bool {
        match self {
            ServiceStatus::Starting | ServiceStatus::Running | ServiceStatus::Paused => true,
            ServiceStatus::Stopped | ServiceStatus::Failed => false,
        }
    }

    pub fn style(self) -> StatusStyle {
        match self {
            ServiceStatus::Running => StatusStyle {
                color: StatusColor::Green,
                symbol: "●",
                bold: false,
            },
            ServiceStatus::Starting => StatusStyle {
                color: StatusColor::Cyan,
                symbol: "◌",
                bold: false,
            },
            ServiceStatus::Paused => StatusStyle {
                color: StatusColor::Yellow,
                symbol: "‖",
                bold: false,
            },
            ServiceStatus::Stopped => StatusStyle {
                color: StatusColor::Red,
                symbol: "○",
                bold: false,
            },
            ServiceStatus::Failed => StatusStyle {
                color: StatusColor::BrightRed,
                symbol: "✗",
                bold: true,
            },
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceStatus::Stopped => write!(f, "stopped"),
            ServiceStatus::Starting => write!(f, "starting"),
            ServiceStatus::Running => write!(f, "running"),
            ServiceStatus::Paused => write!(f, "paused"),
            ServiceStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Persisted description plus observed runtime state of one supervised process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: ServiceId,
    pub name: String,
    /// Command line, split into arguments when the service starts
    pub command: String,
    pub status: ServiceStatus,
    pub pid: Option<u32>,
    pub auto_restart: bool,
    pub restart_count: u32,
    pub max_restart_attempts: u32,
    /// Delay before an automatic restart (in seconds)
    pub restart_delay: u64,
    pub working_directory: PathBuf,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRecord {
    pub fn new(id: ServiceId, name: String, command: String, working_directory: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            command,
            status: ServiceStatus::Stopped,
            pid: None,
            auto_restart: true,
            restart_count: 0,
            max_restart_attempts: 3,
            restart_delay: 5,
            working_directory,
            environment: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Change status, dropping the pid when the new state cannot hold one
    pub fn set_status(&mut self, status: ServiceStatus) {
        self.status = status;
        if !status.holds_process() {
            self.pid = None;
        }
        self.touch();
    }

    /// Record a freshly spawned process
    pub fn attach_pid(&mut self, pid: u32) {
        self.pid = Some(pid);
        self.set_status(ServiceStatus::Running);
    }

    /// The process is gone: forget it and fall back to stopped
    pub fn clear_pid(&mut self) {
        self.pid = None;
        self.set_status(ServiceStatus::Stopped);
    }

    pub fn increment_restart_count(&mut self) {
        self.restart_count = self.restart_count.saturating_add(1);
        self.touch();
    }

    pub fn reset_restart_count(&mut self) {
        self.restart_count = 0;
        self.touch();
    }

    fn touch(&mut self) {
        let now = Utc::now();
        // Keep updated_at strictly increasing even on coarse clocks
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + chrono::Duration::microseconds(1)
        };
    }
}
