//! Simulation State
//!
//! Progress counters of a running work unit together with the engine context
//! that produced them. The driver is the only owner and the only writer.
//!
//! # Critical Invariants
//!
//! 1. **Monotonic steps**: `step_count` never decreases
//! 2. **Ordered markers**: `last_checkpoint_step <= last_frame_step <= step_count`
//!    once the first checkpoint has been acknowledged
//! 3. **Exclusive engine**: the engine context lives and dies with this state

use crate::engine::EngineContext;
use std::time::Duration;

/// Engine state captured right after a frame passed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSnapshot {
    pub step: u64,
    pub state: Vec<u8>,
}

/// Complete state of a running work unit
pub struct SimulationState {
    pub(crate) stream_id: String,
    pub(crate) target_id: String,
    /// Name the state artifact had in `stream_files`; checkpoints reuse it
    pub(crate) state_file: String,

    pub(crate) frame_interval: u64,
    pub(crate) target_steps: u64,
    pub(crate) step_size_ns: f64,

    pub(crate) step_count: u64,
    pub(crate) run_start: Duration,
    pub(crate) last_frame_step: u64,
    pub(crate) last_checkpoint_step: u64,
    pub(crate) last_checkpoint_time: Duration,
    pub(crate) last_heartbeat_time: Duration,

    pub(crate) frames_emitted: u64,
    pub(crate) frames_failed: u64,
    pub(crate) checkpoints_uploaded: u64,

    pub(crate) last_verified: Option<VerifiedSnapshot>,
    pub(crate) engine: Box<dyn EngineContext>,
}

impl SimulationState {
    pub(crate) fn new(
        stream_id: String,
        target_id: String,
        state_file: String,
        frame_interval: u64,
        target_steps: u64,
        now: Duration,
        engine: Box<dyn EngineContext>,
    ) -> Self {
        let step_size_ns = engine.step_size_ns();
        Self {
            stream_id,
            target_id,
            state_file,
            frame_interval,
            target_steps,
            step_size_ns,
            step_count: 0,
            run_start: now,
            last_frame_step: 0,
            last_checkpoint_step: 0,
            last_checkpoint_time: now,
            last_heartbeat_time: now,
            frames_emitted: 0,
            frames_failed: 0,
            checkpoints_uploaded: 0,
            last_verified: None,
            engine,
        }
    }

    /// Record that `steps` more steps ran
    pub(crate) fn advance(&mut self, steps: u64) {
        self.step_count += steps;
    }

    /// Steps to run in the next batch
    ///
    /// Batches stop exactly on frame boundaries and on the target.
    pub(crate) fn next_batch(&self, max_batch: u64) -> u64 {
        let to_frame = self
            .frame_interval
            .saturating_sub(self.step_count - self.last_frame_step);
        let to_target = self.target_steps.saturating_sub(self.step_count);
        max_batch.min(to_frame.max(1)).min(to_target)
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn state_file(&self) -> &str {
        &self.state_file
    }

    pub fn frame_interval(&self) -> u64 {
        self.frame_interval
    }

    pub fn target_steps(&self) -> u64 {
        self.target_steps
    }

    pub fn step_size_ns(&self) -> f64 {
        self.step_size_ns
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn run_start(&self) -> Duration {
        self.run_start
    }

    pub fn last_frame_step(&self) -> u64 {
        self.last_frame_step
    }

    pub fn last_checkpoint_step(&self) -> u64 {
        self.last_checkpoint_step
    }

    pub fn last_checkpoint_time(&self) -> Duration {
        self.last_checkpoint_time
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    pub fn frames_failed(&self) -> u64 {
        self.frames_failed
    }

    pub fn checkpoints_uploaded(&self) -> u64 {
        self.checkpoints_uploaded
    }

    pub fn last_verified(&self) -> Option<&VerifiedSnapshot> {
        self.last_verified.as_ref()
    }

    pub fn is_target_reached(&self) -> bool {
        self.step_count >= self.target_steps
    }

    pub fn engine(&self) -> &dyn EngineContext {
        self.engine.as_ref()
    }
}

impl std::fmt::Debug for SimulationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationState")
            .field("stream_id", &self.stream_id)
            .field("target_id", &self.target_id)
            .field("step_count", &self.step_count)
            .field("target_steps", &self.target_steps)
            .field("last_frame_step", &self.last_frame_step)
            .field("last_checkpoint_step", &self.last_checkpoint_step)
            .field("frames_emitted", &self.frames_emitted)
            .field("checkpoints_uploaded", &self.checkpoints_uploaded)
            .finish()
    }
}
