use super::{HeartbeatCallback, HeartbeatScheduler};
use crate::metrics::{MetricsError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info};

struct RunningTask {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    /// `true` while ticks may run. A tick holds the lock for the whole callback.
    live: Arc<Mutex<bool>>,
}

/// Scheduler that ticks every `period` on a tokio runtime.
///
/// The first tick fires one period after `schedule()`. Missed ticks are
/// delayed, not bursted.
///
/// Once `cancel()` returns, no callback is running and none will start. A
/// tick in flight on another thread is waited for, so `cancel()` must not be
/// called from inside the callback.
pub struct IntervalHeartbeat {
    name: String,
    period: Duration,
    runtime: Option<Handle>,
    task: Mutex<Option<RunningTask>>,
}

impl IntervalHeartbeat {
    /// Uses the runtime current at `schedule()` time
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        IntervalHeartbeat {
            name: name.into(),
            period,
            runtime: None,
            task: Mutex::new(None),
        }
    }

    /// Spawn ticks on `runtime` instead of the current one
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one callback unless cancelled. Returns false once cancelled.
    fn tick(name: &str, live: &Mutex<bool>, callback: &HeartbeatCallback) -> bool {
        let live = live.lock();
        if !*live {
            return false;
        }
        debug!(heartbeat = %name, "Heartbeat tick");
        callback();
        true
    }

    async fn run(
        name: String,
        period: Duration,
        callback: HeartbeatCallback,
        live: Arc<Mutex<bool>>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {
                    if !Self::tick(&name, &live, &callback) {
                        break;
                    }
                }
            }
        }
        info!(heartbeat = %name, "Heartbeat stopped");
    }
}

impl HeartbeatScheduler for IntervalHeartbeat {
    fn schedule(&self, callback: HeartbeatCallback) -> Result<()> {
        if self.period.is_zero() {
            return Err(MetricsError::Configuration(format!(
                "heartbeat '{}' needs a non-zero period",
                self.name
            )));
        }

        let mut task = self.task.lock();
        if task.is_some() {
            return Err(MetricsError::Lifecycle(format!(
                "heartbeat '{}' is already scheduled",
                self.name
            )));
        }

        let runtime = match &self.runtime {
            Some(handle) => handle.clone(),
            None => Handle::try_current().map_err(|e| {
                MetricsError::Lifecycle(format!(
                    "heartbeat '{}' needs a tokio runtime: {}",
                    self.name, e
                ))
            })?,
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let live = Arc::new(Mutex::new(true));
        let handle = runtime.spawn(Self::run(
            self.name.clone(),
            self.period,
            callback,
            Arc::clone(&live),
            shutdown_rx,
        ));
        info!(heartbeat = %self.name, period_ms = self.period.as_millis() as u64, "Heartbeat scheduled");

        *task = Some(RunningTask {
            shutdown_tx,
            handle,
            live,
        });
        Ok(())
    }

    fn cancel(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            // Blocks until an in-flight callback returns
            *task.live.lock() = false;
            let _ = task.shutdown_tx.send(());
            task.handle.abort();
        }
    }

    fn is_scheduled(&self) -> bool {
        self.task.lock().is_some()
    }

    fn tick_period(&self) -> Option<Duration> {
        Some(self.period)
    }
}

impl Drop for IntervalHeartbeat {
    fn drop(&mut self) {
        self.cancel();
    }
}
