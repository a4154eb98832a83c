// Supervisor module - the operations offered to the CLI and the daemon

mod locks;


pub use locks::RecordLocks;

use crate::config::Config;
use crate::error::{OverseerError, Result};
use crate::logs::{LogManager, LogStream};
use crate::process::{ControllerConfig, HealthMonitor, ProcessController, ProcessMetrics};
use crate::service::{ServiceId, ServiceRecord, ServiceStatus};
use crate::state::{NewService, ServiceStore};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Record plus live process details, as shown by `status`
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatusReport {
    pub record: ServiceRecord,
    pub metrics: Option<ProcessMetrics>,
    pub uptime: Option<Duration>,
}

/// Service counts across the whole store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceSummary {
    pub total: usize,
    pub running: usize,
    pub paused: usize,
    pub failed: usize,
    pub auto_restart: usize,
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Start,
    Stop { force: bool },
    Restart { force: bool },
    Pause,
    Resume,
}

/// Facade over the store, the process controller and the health monitor.
///
/// Every control operation resolves its target by id or name, then under the
/// record's lock re-reads the record, acts on the process and writes the
/// record back. Locks only cover this process: another process driving the
/// same services file can still interleave, and the last write wins.
#[derive(Clone)]
pub struct Supervisor {
    config: Arc<Config>,
    store: Arc<Mutex<ServiceStore>>,
    controller: Arc<ProcessController>,
    locks: Arc<RecordLocks>,
}

impl Supervisor {
    pub fn open(config: Config) -> Result<Self> {
        let store = ServiceStore::open(config.services_db_path())?;
        let controller = ProcessController::new(
            ControllerConfig::from(&config.process),
            LogManager::new(&config.paths.log_dir),
        );

        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(Mutex::new(store)),
            controller: Arc::new(controller),
            locks: Arc::new(RecordLocks::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn controller(&self) -> &ProcessController {
        &self.controller
    }

    /// Health monitor sharing this supervisor's store and locks
    pub fn monitor(&self) -> HealthMonitor {
        HealthMonitor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.controller),
            Arc::clone(&self.locks),
            &self.config.monitor,
        )
    }

    pub async fn add(&self, new: NewService) -> Result<ServiceRecord> {
        let record = self.store.lock().await.add(new, &self.config.services)?;
        info!(service = %record.name, id = %record.id, "service added");
        Ok(record)
    }

    pub async fn start(&self, target: &str) -> Result<bool> {
        self.apply(target, Action::Start).await
    }

    pub async fn stop(&self, target: &str, force: bool) -> Result<bool> {
        self.apply(target, Action::Stop { force }).await
    }

    /// Stop then start; a successful restart counts towards `restart_count`
    pub async fn restart(&self, target: &str, force: bool) -> Result<bool> {
        self.apply(target, Action::Restart { force }).await
    }

    pub async fn pause(&self, target: &str) -> Result<bool> {
        self.apply(target, Action::Pause).await
    }

    pub async fn resume(&self, target: &str) -> Result<bool> {
        self.apply(target, Action::Resume).await
    }

    async fn apply(&self, target: &str, action: Action) -> Result<bool> {
        let id = self.resolve(target).await?;
        let _guard = self.locks.lock(&id).await;
        let mut record = self.load(&id).await?;

        debug!(service = %record.name, ?action, "applying action");

        let done = match action {
            Action::Start => {
                // An explicit start gives a failed service a fresh budget
                if record.status == ServiceStatus::Failed {
                    record.reset_restart_count();
                }
                self.controller.start(&mut record).await
            }
            Action::Stop { force } => self.controller.stop(&mut record, force).await,
            Action::Restart { force } => {
                if record.status == ServiceStatus::Failed {
                    record.reset_restart_count();
                }
                let restarted = self.controller.restart(&mut record, force).await;
                if restarted {
                    record.increment_restart_count();
                }
                restarted
            }
            Action::Pause => self.controller.pause(&mut record).await,
            Action::Resume => self.controller.resume(&mut record).await,
        };

        self.persist(&record).await?;
        Ok(done)
    }

    /// Delete a service.
    ///
    /// A service with a live process is only removed when `force` is set, in
    /// which case the process is killed first. Log files are kept.
    pub async fn remove(&self, target: &str, force: bool) -> Result<bool> {
        let id = self.resolve(target).await?;
        let _guard = self.locks.lock(&id).await;
        let mut record = self.load(&id).await?;

        let live = record.pid.is_some_and(|pid| self.controller.is_alive(pid));
        if live {
            if !force {
                info!(service = %record.name, "refusing to remove a running service");
                return Ok(false);
            }
            if !self.controller.stop(&mut record, true).await {
                self.persist(&record).await?;
                return Ok(false);
            }
        }

        self.store.lock().await.remove(&id)?;
        self.locks.forget(&id);
        info!(service = %record.name, id = %id, "service removed");
        Ok(true)
    }

    /// Look a service up by id or name without touching its status
    pub async fn get(&self, target: &str) -> Result<Option<ServiceRecord>> {
        let mut store = self.store.lock().await;
        store.reload()?;
        Ok(store.find_by_id_or_name(target).cloned())
    }

    /// Every service in creation order, each reconciled against the OS first
    pub async fn list(&self) -> Result<Vec<ServiceRecord>> {
        let services = {
            let mut store = self.store.lock().await;
            store.reload()?;
            store.list_all()
        };

        let mut reconciled = Vec::with_capacity(services.len());
        for service in services {
            match self.reconciled(&service.id).await {
                Ok(record) => reconciled.push(record),
                // Removed concurrently
                Err(OverseerError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(reconciled)
    }

    /// Reconciled record with live metrics, or `None` for an unknown target
    pub async fn status_snapshot(&self, target: &str) -> Result<Option<ServiceStatusReport>> {
        let id = match self.resolve(target).await {
            Ok(id) => id,
            Err(OverseerError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let record = match self.reconciled(&id).await {
            Ok(record) => record,
            Err(OverseerError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let metrics = self.controller.inspect(&record);
        let uptime = metrics.as_ref().map(ProcessMetrics::uptime);

        Ok(Some(ServiceStatusReport {
            record,
            metrics,
            uptime,
        }))
    }

    /// Zero the restart counter and lift a FAILED service back to STOPPED
    pub async fn reset_restarts(&self, target: &str) -> Result<ServiceRecord> {
        let id = self.resolve(target).await?;
        let _guard = self.locks.lock(&id).await;
        let mut record = self.load(&id).await?;

        record.reset_restart_count();
        if record.status == ServiceStatus::Failed {
            record.set_status(ServiceStatus::Stopped);
        }

        self.persist(&record).await?;
        Ok(record)
    }

    pub async fn summary(&self) -> Result<ServiceSummary> {
        let services = self.list().await?;
        let count = |status: ServiceStatus| services.iter().filter(|s| s.status == status).count();

        Ok(ServiceSummary {
            total: services.len(),
            running: count(ServiceStatus::Running),
            paused: count(ServiceStatus::Paused),
            failed: count(ServiceStatus::Failed),
            auto_restart: services.iter().filter(|s| s.auto_restart).count(),
        })
    }

    /// Last `lines` lines of a service's output (all of it for 0)
    pub async fn logs(&self, target: &str, lines: usize) -> Result<Vec<String>> {
        let id = self.resolve(target).await?;
        self.controller.logs().read_last_lines(&id, lines).await
    }

    pub async fn follow_logs(&self, target: &str) -> Result<LogStream> {
        let id = self.resolve(target).await?;
        self.controller.logs().follow(&id).await
    }

    pub async fn clear_logs(&self, target: &str) -> Result<()> {
        let id = self.resolve(target).await?;
        self.controller.logs().clear(&id)?;
        info!(id = %id, "service log cleared");
        Ok(())
    }

    pub async fn log_path(&self, target: &str) -> Result<PathBuf> {
        let id = self.resolve(target).await?;
        Ok(self.controller.logs().log_path(&id))
    }

    async fn reconciled(&self, id: &ServiceId) -> Result<ServiceRecord> {
        let _guard = self.locks.lock(id).await;
        let mut record = self.load(id).await?;
        if self.reconcile(&mut record) {
            self.persist(&record).await?;
        }
        Ok(record)
    }

    /// Align a record's status with what the OS reports. Returns whether the
    /// record changed.
    fn reconcile(&self, record: &mut ServiceRecord) -> bool {
        match record.pid {
            Some(pid) if self.controller.is_alive(pid) => {
                if matches!(record.status, ServiceStatus::Running | ServiceStatus::Paused) {
                    return false;
                }
                record.set_status(ServiceStatus::Running);
                true
            }
            Some(_) => {
                // A crashed auto-restart service belongs to the health monitor
                if record.status == ServiceStatus::Running && record.auto_restart {
                    return false;
                }
                record.clear_pid();
                true
            }
            None => {
                if !matches!(record.status, ServiceStatus::Running | ServiceStatus::Paused) {
                    return false;
                }
                record.set_status(ServiceStatus::Stopped);
                true
            }
        }
    }

    async fn resolve(&self, target: &str) -> Result<ServiceId> {
        let mut store = self.store.lock().await;
        store.reload()?;
        store
            .find_by_id_or_name(target)
            .map(|record| record.id.clone())
            .ok_or_else(|| OverseerError::NotFound(target.to_string()))
    }

    async fn load(&self, id: &ServiceId) -> Result<ServiceRecord> {
        let mut store = self.store.lock().await;
        store.reload()?;
        store
            .get_by_id(id.as_str())
            .cloned()
            .ok_or_else(|| OverseerError::NotFound(id.to_string()))
    }

    async fn persist(&self, record: &ServiceRecord) -> Result<()> {
        self.store.lock().await.update(record.clone())
    }
}
