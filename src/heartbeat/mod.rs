//! Heartbeat scheduling port
//!
//! Periodic work (the cluster metrics sweep) is driven through a
//! `HeartbeatScheduler` rather than an owned timer:
//!
//! - `IntervalHeartbeat` ticks on a tokio interval in production
//! - `ManualHeartbeat` ticks only when a test calls `execute()`
//!
//! The scheduler owns nothing but the callback; stopping it halts future ticks
//! and leaves whatever the callback already produced in place.

mod interval;
mod manual;

pub use interval::IntervalHeartbeat;
pub use manual::ManualHeartbeat;

use crate::metrics::Result;
use std::sync::Arc;
use std::time::Duration;

/// Zero-argument tick callback
pub type HeartbeatCallback = Arc<dyn Fn() + Send + Sync>;

pub trait HeartbeatScheduler: Send + Sync {
    /// Start invoking `callback` on every tick. Fails if already scheduled.
    fn schedule(&self, callback: HeartbeatCallback) -> Result<()>;

    /// Stop future ticks. A no-op when nothing is scheduled.
    fn cancel(&self);

    fn is_scheduled(&self) -> bool;

    /// Time between ticks, if the scheduler ticks on its own
    fn tick_period(&self) -> Option<Duration> {
        None
    }
}
