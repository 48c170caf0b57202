//! Wall-clock management for the control loop
//!
//! The driver never reads `Instant::now()` directly. Every trigger that depends
//! on elapsed time (checkpoints, heartbeats, throughput) goes through a
//! [`WallClock`], so production runs use the system monotonic clock and tests
//! drive time explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of elapsed wall-clock time for a run
///
/// `elapsed` is measured from the moment the clock was created and must be
/// monotonically non-decreasing.
pub trait WallClock: Send {
    /// Time elapsed since the clock was created
    fn elapsed(&self) -> Duration;

    /// Block the control loop for `duration`
    fn sleep(&self, duration: Duration);
}

/// Monotonic system clock
///
/// # Example
/// ```
/// use grid_worker_core::core::time::{SystemClock, WallClock};
///
/// let clock = SystemClock::new();
/// let first = clock.elapsed();
/// assert!(clock.elapsed() >= first);
/// ```
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Manually advanced clock
///
/// Clones share the same underlying time, so an engine under test can advance
/// the clock the driver reads. `sleep` advances time instead of blocking.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use grid_worker_core::core::time::{ManualClock, WallClock};
///
/// let clock = ManualClock::new();
/// let shared = clock.clone();
/// shared.advance(Duration::from_millis(250));
/// assert_eq!(clock.elapsed(), Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `duration`
    pub fn advance(&self, duration: Duration) {
        let delta = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(delta, Ordering::SeqCst);
    }
}

impl WallClock for ManualClock {
    fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
