use crate::service::ServiceRecord;
use std::time::Duration;

/// Auto-restart policy of a single service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Whether automatic restart is enabled
    pub enabled: bool,
    /// Restarts allowed before the service is marked failed
    pub max_attempts: u32,
    /// Fixed delay before each restart attempt
    pub delay: Duration,
}

impl RestartPolicy {
    pub fn from_record(record: &ServiceRecord) -> Self {
        Self {
            enabled: record.auto_restart,
            max_attempts: record.max_restart_attempts,
            delay: Duration::from_secs(record.restart_delay),
        }
    }

    /// True once `restart_count` has used up every allowed attempt
    pub fn exhausted(&self, restart_count: u32) -> bool {
        restart_count >= self.max_attempts
    }

    /// Whether a crashed service with `restart_count` restarts so far should
    /// be relaunched
    pub fn should_restart(&self, restart_count: u32) -> bool {
        self.enabled && !self.exhausted(restart_count)
    }
}
