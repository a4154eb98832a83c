use crate::service::ServiceId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per service id.
///
/// Holding a record's guard serialises every read-act-write cycle on that
/// record inside this process: facade operations and monitor ticks never
/// interleave on the same service.
#[derive(Debug, Default)]
pub struct RecordLocks {
    locks: Mutex<HashMap<ServiceId, Arc<AsyncMutex<()>>>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: &ServiceId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(locks.entry(id.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drop the lock entry of a deleted service
    pub fn forget(&self, id: &ServiceId) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.remove(id);
    }
}
