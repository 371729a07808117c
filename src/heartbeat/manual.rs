use super::{HeartbeatCallback, HeartbeatScheduler};
use crate::metrics::{MetricsError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Scheduler that ticks only on `execute()`.
///
/// Clones share the same callback slot, so a test can keep one handle and give
/// another to the service under test.
#[derive(Clone, Default)]
pub struct ManualHeartbeat {
    callback: Arc<Mutex<Option<HeartbeatCallback>>>,
    executions: Arc<AtomicU64>,
}

impl ManualHeartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one tick synchronously. Returns false if nothing is scheduled.
    pub fn execute(&self) -> bool {
        let callback = self.callback.lock().clone();
        match callback {
            Some(callback) => {
                callback();
                self.executions.fetch_add(1, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Ticks run so far
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }
}

impl HeartbeatScheduler for ManualHeartbeat {
    fn schedule(&self, callback: HeartbeatCallback) -> Result<()> {
        let mut slot = self.callback.lock();
        if slot.is_some() {
            return Err(MetricsError::Lifecycle(
                "manual heartbeat is already scheduled".to_string(),
            ));
        }
        *slot = Some(callback);
        Ok(())
    }

    fn cancel(&self) {
        self.callback.lock().take();
    }

    fn is_scheduled(&self) -> bool {
        self.callback.lock().is_some()
    }
}
