use crate::config::MonitorSettings;
use crate::error::Result;
use crate::process::controller::ProcessController;
use crate::process::restart::RestartPolicy;
use crate::service::{ServiceId, ServiceRecord, ServiceStatus};
use crate::state::ServiceStore;
use crate::supervisor::RecordLocks;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Periodic health checker that restarts crashed services.
///
/// Each tick walks the stored services in listing order. A RUNNING service
/// whose process is gone is treated as a crash and restarted according to its
/// [`RestartPolicy`]; a service stuck in STARTING past the start timeout is
/// marked FAILED. Only services with `auto_restart` enabled are considered,
/// and FAILED is never cleared here.
#[derive(Clone)]
pub struct HealthMonitor {
    store: Arc<Mutex<ServiceStore>>,
    controller: Arc<ProcessController>,
    locks: Arc<RecordLocks>,
    check_interval: Duration,
    start_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        store: Arc<Mutex<ServiceStore>>,
        controller: Arc<ProcessController>,
        locks: Arc<RecordLocks>,
        settings: &MonitorSettings,
    ) -> Self {
        Self {
            store,
            controller,
            locks,
            check_interval: settings.check_interval(),
            start_timeout: settings.start_timeout(),
        }
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Run a single tick.
    ///
    /// Fails only when the store cannot be read; problems with individual
    /// services are logged and do not abort the tick.
    pub async fn check_services(&self) -> Result<()> {
        let services = {
            let mut store = self.store.lock().await;
            store.reload()?;
            store.list_all()
        };

        debug!(count = services.len(), "health check");

        for service in services {
            if !service.auto_restart {
                continue;
            }

            if let Err(e) = self.check_service(&service.id).await {
                error!(service = %service.name, error = %e, "health check failed");
            }
        }

        Ok(())
    }

    async fn check_service(&self, id: &ServiceId) -> Result<()> {
        let _guard = self.locks.lock(id).await;

        // Re-read under the lock: the listing may be stale by now
        let record = {
            let mut store = self.store.lock().await;
            store.reload()?;
            store.get_by_id(id.as_str()).cloned()
        };
        let Some(record) = record else {
            return Ok(());
        };
        if !record.auto_restart {
            return Ok(());
        }

        match (record.status, record.pid) {
            (ServiceStatus::Running, Some(pid)) if !self.controller.is_alive(pid) => {
                self.handle_crash(record, pid).await
            }
            (ServiceStatus::Starting, _) if self.start_timed_out(&record) => {
                warn!(
                    service = %record.name,
                    timeout = ?self.start_timeout,
                    "service stuck starting, marking failed"
                );
                let mut record = record;
                record.set_status(ServiceStatus::Failed);
                self.persist(&record).await
            }
            _ => Ok(()),
        }
    }

    async fn handle_crash(&self, mut record: ServiceRecord, pid: u32) -> Result<()> {
        warn!(
            service = %record.name,
            pid,
            restart_count = record.restart_count,
            "service exited unexpectedly"
        );

        record.clear_pid();
        self.persist(&record).await?;

        let policy = RestartPolicy::from_record(&record);
        if !policy.should_restart(record.restart_count) {
            error!(
                service = %record.name,
                max_attempts = policy.max_attempts,
                "restart attempts exhausted, marking failed"
            );
            record.set_status(ServiceStatus::Failed);
            return self.persist(&record).await;
        }

        if !policy.delay.is_zero() {
            info!(service = %record.name, delay = ?policy.delay, "waiting before restart");
            sleep(policy.delay).await;
        }

        info!(
            service = %record.name,
            attempt = record.restart_count + 1,
            "restarting service"
        );
        record.set_status(ServiceStatus::Starting);
        self.persist(&record).await?;

        if self.controller.start(&mut record).await {
            record.increment_restart_count();
            info!(service = %record.name, pid = ?record.pid, "service restarted");
        } else {
            record.set_status(ServiceStatus::Failed);
            error!(service = %record.name, "restart failed");
        }

        self.persist(&record).await
    }

    fn start_timed_out(&self, record: &ServiceRecord) -> bool {
        let elapsed = Utc::now() - record.updated_at;
        match chrono::Duration::from_std(self.start_timeout) {
            Ok(timeout) => elapsed > timeout,
            Err(_) => false,
        }
    }

    async fn persist(&self, record: &ServiceRecord) -> Result<()> {
        self.store.lock().await.update(record.clone())
    }

    /// Tick until `stop` flips to true or its sender goes away.
    ///
    /// The stop flag is only observed between ticks, so a tick in progress
    /// (including any restart backoff) always runs to completion.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        info!(interval = ?self.check_interval, "health monitor started");

        loop {
            if *stop.borrow() {
                break;
            }

            if let Err(e) = self.check_services().await {
                error!(error = %e, "health tick failed");
            }

            tokio::select! {
                _ = sleep(self.check_interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("health monitor stopped");
    }

    /// Run the monitor loop on a background task
    pub fn spawn(self) -> MonitorHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(stop_rx).await });
        MonitorHandle { stop_tx, task }
    }
}

/// Control handle of a spawned [`HealthMonitor`]
pub struct MonitorHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Ask the loop to stop at the next tick boundary and wait for it
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "health monitor task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::LogManager;
    use crate::process::ControllerConfig;
    use tempfile::TempDir;

    fn monitor(temp_dir: &TempDir) -> HealthMonitor {
        let store = ServiceStore::open(temp_dir.path().join("services.json")).unwrap();
        let controller =
            ProcessController::new(ControllerConfig::default(), LogManager::new(temp_dir.path()));
        HealthMonitor::new(
            Arc::new(Mutex::new(store)),
            Arc::new(controller),
            Arc::new(RecordLocks::new()),
            &MonitorSettings {
                check_interval: 1,
                start_timeout: 1,
            },
        )
    }

    #[tokio::test]
    async fn test_tick_on_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        monitor(&temp_dir).check_services().await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_stops_loop() {
        let temp_dir = TempDir::new().unwrap();
        let handle = monitor(&temp_dir).spawn();

        sleep(Duration::from_millis(50)).await;
        assert!(handle.is_running());

        tokio::time::timeout(Duration::from_secs(2), handle.stop())
            .await
            .expect("monitor did not stop at tick boundary");
    }
}
