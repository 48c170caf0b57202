//! Throughput metrics derived from run counters
//!
//! Pure arithmetic over counters the driver supplies. Both rates are guarded
//! against a zero divisor and report zero instead.

use serde::Serialize;
use std::time::Duration;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Counters sampled from a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressCounters {
    pub steps: u64,
    pub frames: u64,
    pub elapsed: Duration,
}

/// Metrics reported at frame boundaries and in the run summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThroughputReport {
    pub steps: u64,
    pub frames: u64,
    pub elapsed_secs: f64,
    pub secs_per_frame: f64,
    pub ns_per_day: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputMonitor {
    step_size_ns: f64,
}

impl ThroughputMonitor {
    pub fn new(step_size_ns: f64) -> Self {
        Self { step_size_ns }
    }

    pub fn step_size_ns(&self) -> f64 {
        self.step_size_ns
    }

    /// Average wall time per frame, zero before the first frame
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use grid_worker_core::orchestrator::ThroughputMonitor;
    ///
    /// assert_eq!(ThroughputMonitor::time_per_frame(Duration::from_secs(100), 50), Duration::from_secs(2));
    /// assert_eq!(ThroughputMonitor::time_per_frame(Duration::ZERO, 0), Duration::ZERO);
    /// ```
    pub fn time_per_frame(elapsed: Duration, frames: u64) -> Duration {
        if frames == 0 {
            return Duration::ZERO;
        }
        let nanos = elapsed.as_nanos() / u128::from(frames);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Simulated nanoseconds per wall-clock day
    pub fn ns_per_day(&self, steps: u64, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.step_size_ns * steps as f64 / secs * SECONDS_PER_DAY
    }

    pub fn report(&self, counters: ProgressCounters) -> ThroughputReport {
        ThroughputReport {
            steps: counters.steps,
            frames: counters.frames,
            elapsed_secs: counters.elapsed.as_secs_f64(),
            secs_per_frame: Self::time_per_frame(counters.elapsed, counters.frames).as_secs_f64(),
            ns_per_day: self.ns_per_day(counters.steps, counters.elapsed),
        }
    }
}
