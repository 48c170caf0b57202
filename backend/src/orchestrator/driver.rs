//! Simulation Driver - lifecycle of one work unit
//!
//! Owns the run from the first handshake call to a terminal phase:
//!
//! ```text
//! Uninitialized ──acquire──▶ Assigned ──open_stream──▶ Streaming
//!                                                          │ initialize_engine
//!                                                          ▼
//!            Complete ◀──target reached── Running ◀──ack── Checkpointing
//!                                            │ └──checkpoint due──▶ ▲
//!                                            └─ step batches, frames, heartbeats
//!
//! any non-terminal phase ──fatal error──▶ Failed
//! ```
//!
//! Each call to [`SimulationDriver::advance`] is one control-loop iteration:
//! a step batch followed by trigger evaluation (frame, then checkpoint, then
//! completion), or one checkpoint upload attempt while a checkpoint is
//! pending.
//!
//! # Critical Invariants
//!
//! 1. **No stepping while a checkpoint is pending**: the Checkpointing phase
//!    only retries the upload
//! 2. **Frame spacing**: batches never cross a frame boundary, so frames land
//!    every `frame_interval` steps after the previous frame or checkpoint
//! 3. **Sticky terminals**: Complete and Failed reject every further operation
//! 4. **Verified checkpoints**: every checkpoint holds state that passed
//!    `check_state`

use crate::artifacts::{self, decoded_name, ArtifactNames, ArtifactSet, DecodeError};
use crate::core::time::WallClock;
use crate::engine::{check_state, EngineBackend, EngineError};
use crate::models::{
    Event, EventLog, JobAssignment, JobDescriptor, SimulationState, VerifiedSnapshot,
};
use crate::net::{
    Coordinator, CoordinatorError, EngineRequest, ProtocolError, StreamSession, TransportError,
    UploadBody,
};
use crate::orchestrator::checkpoint::{
    Checkpoint, CheckpointError, CheckpointManager, CheckpointUploadError, FlushOutcome,
    RetryPolicy,
};
use crate::orchestrator::throughput::{ProgressCounters, ThroughputMonitor, ThroughputReport};
use crate::trust::{TrustBundle, TrustLoadError};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Run parameters
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// Steps to run before the work unit is complete
    pub target_steps: u64,
    /// Steps between frames, unless the descriptor overrides it
    pub frame_interval: u64,
    /// Wall time between checkpoints
    pub checkpoint_interval: Duration,
    /// Wall time between heartbeats; zero disables them
    pub heartbeat_interval: Duration,
    /// Upper bound on steps per engine call
    pub max_steps_per_batch: u64,
    /// Largest plausible |total energy|
    pub energy_limit: f64,
    /// Checkpoint the final state before completing
    pub checkpoint_on_complete: bool,
    pub checkpoint_retry: RetryPolicy,
    pub artifacts: ArtifactNames,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            target_steps: 500_000,
            frame_interval: 50_000,
            checkpoint_interval: Duration::from_secs(600),
            heartbeat_interval: Duration::from_secs(60),
            max_steps_per_batch: 500,
            energy_limit: 1.0e9,
            checkpoint_on_complete: true,
            checkpoint_retry: RetryPolicy::default(),
            artifacts: ArtifactNames::default(),
        }
    }
}

// ============================================================================
// Phases and errors
// ============================================================================

/// Lifecycle phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Uninitialized,
    Assigned,
    Streaming,
    Running,
    Checkpointing,
    Complete,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Complete | RunPhase::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunPhase::Uninitialized => "uninitialized",
            RunPhase::Assigned => "assigned",
            RunPhase::Streaming => "streaming",
            RunPhase::Running => "running",
            RunPhase::Checkpointing => "checkpointing",
            RunPhase::Complete => "complete",
            RunPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse failure class, one per process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Trust bundle, TLS, connect, timeout
    Handshake,
    Protocol,
    Decode,
    Engine,
    /// Checkpoint upload abandoned
    Checkpoint,
    Internal,
}

impl ErrorCategory {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorCategory::Handshake => 10,
            ErrorCategory::Protocol => 11,
            ErrorCategory::Decode => 12,
            ErrorCategory::Engine => 13,
            ErrorCategory::Checkpoint => 14,
            ErrorCategory::Internal => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Handshake => "handshake",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Decode => "decode",
            ErrorCategory::Engine => "engine",
            ErrorCategory::Checkpoint => "checkpoint",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any failure of a run
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("trust bundle rejected: {0}")]
    Trust(#[from] TrustLoadError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("artifact decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("checkpoint upload abandoned: {0}")]
    CheckpointUpload(#[from] CheckpointUploadError),

    #[error("checkpoint bookkeeping error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        phase: RunPhase,
        action: &'static str,
    },
}

impl From<CoordinatorError> for SimulationError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::Transport(e) => SimulationError::Transport(e),
            CoordinatorError::Protocol(e) => SimulationError::Protocol(e),
        }
    }
}

impl SimulationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SimulationError::Trust(_) | SimulationError::Transport(_) => ErrorCategory::Handshake,
            SimulationError::Protocol(_) => ErrorCategory::Protocol,
            SimulationError::Decode(_) => ErrorCategory::Decode,
            SimulationError::Engine(_) => ErrorCategory::Engine,
            SimulationError::CheckpointUpload(_) => ErrorCategory::Checkpoint,
            SimulationError::Checkpoint(_) | SimulationError::InvalidTransition { .. } => {
                ErrorCategory::Internal
            }
        }
    }
}

/// Final accounting of a completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub stream_id: String,
    pub target_id: String,
    pub steps: u64,
    pub frames_emitted: u64,
    pub frames_failed: u64,
    pub checkpoints_uploaded: u64,
    pub throughput: ThroughputReport,
}

// ============================================================================
// Driver
// ============================================================================

/// State machine of one run
pub struct SimulationDriver {
    config: DriverConfig,
    backend: Box<dyn EngineBackend>,
    clock: Box<dyn WallClock>,
    phase: RunPhase,
    assignment: Option<JobAssignment>,
    /// Held between open_stream and initialize_engine only
    descriptor: Option<JobDescriptor>,
    session: Option<Box<dyn StreamSession>>,
    state: Option<SimulationState>,
    checkpoints: CheckpointManager,
    events: EventLog,
    failure: Option<ErrorCategory>,
}

impl SimulationDriver {
    pub fn new(
        config: DriverConfig,
        backend: Box<dyn EngineBackend>,
        clock: Box<dyn WallClock>,
    ) -> Self {
        let checkpoints = CheckpointManager::new(config.checkpoint_retry.clone());
        Self {
            config,
            backend,
            clock,
            phase: RunPhase::Uninitialized,
            assignment: None,
            descriptor: None,
            session: None,
            state: None,
            checkpoints,
            events: EventLog::new(),
            failure: None,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn assignment(&self) -> Option<&JobAssignment> {
        self.assignment.as_ref()
    }

    /// Running state, present from engine initialization on
    pub fn state(&self) -> Option<&SimulationState> {
        self.state.as_ref()
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    /// Category of the error that failed the run
    pub fn failure(&self) -> Option<ErrorCategory> {
        self.failure
    }

    pub fn throughput(&self) -> Option<ThroughputReport> {
        let state = self.state.as_ref()?;
        let counters = ProgressCounters {
            steps: state.step_count,
            frames: state.frames_emitted,
            elapsed: self.clock.elapsed().saturating_sub(state.run_start),
        };
        Some(ThroughputMonitor::new(state.step_size_ns).report(counters))
    }

    pub fn summary(&self) -> Option<RunSummary> {
        let state = self.state.as_ref()?;
        Some(RunSummary {
            stream_id: state.stream_id.clone(),
            target_id: state.target_id.clone(),
            steps: state.step_count,
            frames_emitted: state.frames_emitted,
            frames_failed: state.frames_failed,
            checkpoints_uploaded: state.checkpoints_uploaded,
            throughput: self.throughput()?,
        })
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Drive the run from Uninitialized to a terminal phase
    pub fn run(
        &mut self,
        coordinator: &mut dyn Coordinator,
        trust_bundle: Option<&Path>,
    ) -> Result<RunSummary, SimulationError> {
        self.acquire(coordinator, trust_bundle)?;
        self.open_stream(coordinator)?;
        self.initialize_engine()?;
        while !self.phase.is_terminal() {
            self.advance()?;
        }
        self.summary().ok_or_else(|| self.invalid("summarize"))
    }

    /// Load and install the trust bundle file, then request an assignment
    pub fn acquire(
        &mut self,
        coordinator: &mut dyn Coordinator,
        trust_bundle: Option<&Path>,
    ) -> Result<(), SimulationError> {
        self.require(RunPhase::Uninitialized, "acquire an assignment")?;

        let assignment = match self.request_assignment(coordinator, trust_bundle) {
            Ok(assignment) => assignment,
            Err(e) => return Err(self.fail(e)),
        };

        self.events.log(Event::Assigned {
            host: assignment.host.clone(),
            port: assignment.port,
        });
        self.assignment = Some(assignment);
        self.phase = RunPhase::Assigned;
        Ok(())
    }

    /// Fetch the job descriptor and open the session
    pub fn open_stream(&mut self, coordinator: &mut dyn Coordinator) -> Result<(), SimulationError> {
        self.require(RunPhase::Assigned, "open the stream")?;

        let opened = match &self.assignment {
            Some(assignment) => coordinator
                .open_stream(assignment)
                .map_err(SimulationError::from),
            None => Err(self.invalid("open the stream")),
        };
        let (descriptor, session) = match opened {
            Ok(opened) => opened,
            Err(e) => return Err(self.fail(e)),
        };

        self.events.log(Event::StreamOpened {
            stream_id: descriptor.stream_id.clone(),
            target_id: descriptor.target_id.clone(),
        });
        self.descriptor = Some(descriptor);
        self.session = Some(session);
        self.phase = RunPhase::Streaming;
        Ok(())
    }

    /// Decode the artifacts, build the engine and load the stream state
    pub fn initialize_engine(&mut self) -> Result<(), SimulationError> {
        self.require(RunPhase::Streaming, "initialize the engine")?;

        let Some(descriptor) = self.descriptor.take() else {
            return Err(self.invalid("initialize the engine"));
        };
        let state = match self.build_state(descriptor) {
            Ok(state) => state,
            Err(e) => return Err(self.fail(e)),
        };

        info!(
            stream_id = %state.stream_id,
            target_id = %state.target_id,
            engine = self.backend.name(),
            frame_interval = state.frame_interval,
            target_steps = state.target_steps,
            "engine initialized"
        );
        self.events.log(Event::EngineInitialized {
            stream_id: state.stream_id.clone(),
            frame_interval: state.frame_interval,
        });
        self.state = Some(state);
        self.phase = RunPhase::Running;
        Ok(())
    }

    /// Run one control-loop iteration
    ///
    /// Returns the phase after the iteration. Errors have already moved the
    /// run to Failed, except `InvalidTransition`, which changes nothing.
    pub fn advance(&mut self) -> Result<RunPhase, SimulationError> {
        let result = match self.phase {
            RunPhase::Running => {
                self.heartbeat_if_due();
                self.step_once()
            }
            RunPhase::Checkpointing => {
                self.heartbeat_if_due();
                self.flush_checkpoint()
            }
            phase => {
                return Err(SimulationError::InvalidTransition {
                    phase,
                    action: "advance",
                })
            }
        };

        match result {
            Ok(()) => Ok(self.phase),
            Err(e) => Err(self.fail(e)),
        }
    }

    // ========================================================================
    // Setup helpers
    // ========================================================================

    fn request_assignment(
        &self,
        coordinator: &mut dyn Coordinator,
        trust_bundle: Option<&Path>,
    ) -> Result<JobAssignment, SimulationError> {
        if let Some(path) = trust_bundle {
            let bundle = TrustBundle::from_file(path)?;
            coordinator.install_trust(bundle)?;
        }
        let request = EngineRequest::new(self.backend.name(), self.backend.version());
        Ok(coordinator.assign(&request)?)
    }

    fn build_state(&self, descriptor: JobDescriptor) -> Result<SimulationState, SimulationError> {
        let names = &self.config.artifacts;
        let mut targets = ArtifactSet::decode_all(&descriptor.target_files)?;
        let mut streams = ArtifactSet::decode_all(&descriptor.stream_files)?;

        let system = take_artifact(&mut targets, &names.system)?;
        let integrator = take_artifact(&mut targets, &names.integrator)?;
        let initial_state = take_artifact(&mut streams, &names.state)?;

        let mut engine = self.backend.initialize(&system, &integrator)?;
        engine.set_state(&initial_state)?;
        check_state(engine.total_energy()?, self.config.energy_limit)?;

        let frame_interval = descriptor
            .options
            .steps_per_frame
            .filter(|&steps| steps > 0)
            .unwrap_or(self.config.frame_interval);

        Ok(SimulationState::new(
            descriptor.stream_id,
            descriptor.target_id,
            names.state.clone(),
            frame_interval,
            self.config.target_steps,
            self.clock.elapsed(),
            engine,
        ))
    }

    // ========================================================================
    // Control loop
    // ========================================================================

    fn step_once(&mut self) -> Result<(), SimulationError> {
        let phase = self.phase;
        let state = self.state.as_mut().ok_or(SimulationError::InvalidTransition {
            phase,
            action: "step",
        })?;

        let batch = state.next_batch(self.config.max_steps_per_batch);
        if batch > 0 {
            state.engine.step(batch)?;
            state.advance(batch);
            debug!(step = state.step_count, steps = batch, "step batch");
            self.events.log(Event::StepBatch {
                step: state.step_count,
                steps: batch,
            });
        }

        if state.step_count - state.last_frame_step >= state.frame_interval {
            emit_frame(
                state,
                &mut self.session,
                &mut self.events,
                self.config.energy_limit,
            )?;
            let elapsed = self.clock.elapsed().saturating_sub(state.run_start);
            info!(
                step = state.step_count,
                frames = state.frames_emitted,
                ns_per_day = ThroughputMonitor::new(state.step_size_ns)
                    .ns_per_day(state.step_count, elapsed),
                "frame emitted"
            );
        }

        let since_checkpoint = self
            .clock
            .elapsed()
            .saturating_sub(state.last_checkpoint_time);
        if since_checkpoint >= self.config.checkpoint_interval
            && state.step_count > state.last_checkpoint_step
        {
            return self.checkpoint_now();
        }

        if state.is_target_reached() {
            return self.finish();
        }
        Ok(())
    }

    /// Emit the implicit frame if needed, then stage and upload a checkpoint
    fn checkpoint_now(&mut self) -> Result<(), SimulationError> {
        let phase = self.phase;
        let state = self.state.as_mut().ok_or(SimulationError::InvalidTransition {
            phase,
            action: "checkpoint",
        })?;

        if state.last_frame_step < state.step_count {
            emit_frame(
                state,
                &mut self.session,
                &mut self.events,
                self.config.energy_limit,
            )?;
        }

        let snapshot = match &state.last_verified {
            Some(verified) if verified.step == state.step_count => verified.state.clone(),
            _ => state.engine.snapshot_state()?,
        };
        let checkpoint = Checkpoint::new(
            state.step_count,
            frames_since_checkpoint(state, state.step_count),
            &state.state_file,
            &snapshot,
        );

        let step = checkpoint.step();
        self.checkpoints.stage(checkpoint)?;
        debug!(step, "checkpoint staged");
        self.events.log(Event::CheckpointStaged { step });
        self.phase = RunPhase::Checkpointing;

        self.flush_checkpoint()
    }

    fn flush_checkpoint(&mut self) -> Result<(), SimulationError> {
        let phase = self.phase;
        let session = self
            .session
            .as_deref_mut()
            .ok_or(SimulationError::InvalidTransition {
                phase,
                action: "upload a checkpoint",
            })?;

        match self.checkpoints.flush(session)? {
            FlushOutcome::Idle => self.phase = RunPhase::Running,
            FlushOutcome::Acknowledged(ack) => {
                let now = self.clock.elapsed();
                if let Some(state) = self.state.as_mut() {
                    state.last_checkpoint_step = ack.step;
                    state.last_checkpoint_time = now;
                    state.checkpoints_uploaded += 1;
                }
                info!(
                    step = ack.step,
                    attempts = ack.attempts,
                    digest = %ack.digest,
                    "checkpoint uploaded"
                );
                self.events.log(Event::CheckpointUploaded {
                    step: ack.step,
                    attempts: ack.attempts,
                });
                self.phase = RunPhase::Running;
            }
            FlushOutcome::Retrying {
                step,
                attempt,
                error,
            } => {
                let backoff = self.checkpoints.retry_policy().backoff();
                warn!(
                    step,
                    attempt,
                    %error,
                    backoff_ms = backoff.as_millis() as u64,
                    "checkpoint upload failed; retrying"
                );
                self.events.log(Event::CheckpointUploadFailed {
                    step,
                    attempt,
                    reason: error.to_string(),
                });
                self.clock.sleep(backoff);
                return Ok(());
            }
        }

        if self
            .state
            .as_ref()
            .map_or(false, SimulationState::is_target_reached)
        {
            return self.finish();
        }
        Ok(())
    }

    /// Target reached: checkpoint the final state if needed, then complete
    fn finish(&mut self) -> Result<(), SimulationError> {
        let needs_checkpoint = self.config.checkpoint_on_complete
            && self
                .state
                .as_ref()
                .map_or(false, |s| s.last_checkpoint_step < s.step_count);
        if needs_checkpoint {
            return self.checkpoint_now();
        }

        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.stop(None) {
                warn!(error = %e, "stop request failed");
            }
        }

        let step = self.state.as_ref().map_or(0, |s| s.step_count);
        self.events.log(Event::Completed { step });
        self.phase = RunPhase::Complete;

        if let Some(report) = self.throughput() {
            info!(
                step,
                frames = report.frames,
                secs_per_frame = report.secs_per_frame,
                ns_per_day = report.ns_per_day,
                "run complete"
            );
        }
        Ok(())
    }

    fn heartbeat_if_due(&mut self) {
        let interval = self.config.heartbeat_interval;
        if interval.is_zero() {
            return;
        }
        let now = self.clock.elapsed();
        let (Some(state), Some(session)) = (self.state.as_mut(), self.session.as_mut()) else {
            return;
        };
        if now.saturating_sub(state.last_heartbeat_time) < interval {
            return;
        }

        state.last_heartbeat_time = now;
        let step = state.step_count;
        match session.heartbeat() {
            Ok(()) => {
                debug!(step, "heartbeat sent");
                self.events.log(Event::HeartbeatSent { step });
            }
            Err(e) => {
                warn!(step, error = %e, "heartbeat failed");
                self.events.log(Event::HeartbeatFailed {
                    step,
                    reason: e.to_string(),
                });
            }
        }
    }

    // ========================================================================
    // Failure handling
    // ========================================================================

    /// Move to Failed and hand the error back
    fn fail(&mut self, error: SimulationError) -> SimulationError {
        let category = error.category();
        let message = error.to_string();
        let step = self.state.as_ref().map_or(0, |s| s.step_count);
        error!(step, %category, "run failed: {}", message);

        if category == ErrorCategory::Engine {
            self.salvage_verified_state();
        }

        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.stop(Some(&message)) {
                warn!(error = %e, "stop request failed");
            }
        }

        self.events.log(Event::Failed {
            step,
            category: category.to_string(),
            message,
        });
        self.phase = RunPhase::Failed;
        self.failure = Some(category);
        error
    }

    /// One upload attempt of the last verified state, if the coordinator
    /// does not already hold it
    fn salvage_verified_state(&mut self) {
        if self.checkpoints.is_pending() {
            return;
        }
        let (Some(state), Some(session)) = (self.state.as_mut(), self.session.as_mut()) else {
            return;
        };
        let Some(verified) = state.last_verified.as_ref() else {
            return;
        };
        if verified.step <= state.last_checkpoint_step {
            return;
        }

        let checkpoint = Checkpoint::new(
            verified.step,
            frames_since_checkpoint(state, verified.step),
            &state.state_file,
            &verified.state,
        );
        match self.checkpoints.upload_once(session.as_mut(), checkpoint) {
            Ok(ack) => {
                info!(step = ack.step, "uploaded last verified state");
                state.last_checkpoint_step = ack.step;
                state.checkpoints_uploaded += 1;
                self.events.log(Event::CheckpointUploaded {
                    step: ack.step,
                    attempts: ack.attempts,
                });
            }
            Err(e) => {
                warn!(step = e.checkpoint.step(), error = %e.source, "final checkpoint failed");
            }
        }
    }

    fn require(&self, expected: RunPhase, action: &'static str) -> Result<(), SimulationError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> SimulationError {
        SimulationError::InvalidTransition {
            phase: self.phase,
            action,
        }
    }
}

impl fmt::Debug for SimulationDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationDriver")
            .field("phase", &self.phase)
            .field("engine", &self.backend.name())
            .field("assignment", &self.assignment)
            .field("state", &self.state)
            .field("checkpoints", &self.checkpoints)
            .field("events", &self.events.len())
            .finish()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Verify the state, record the frame and upload it
///
/// Only verification and engine errors are returned; a failed frame upload is
/// counted and the run continues.
fn emit_frame(
    state: &mut SimulationState,
    session: &mut Option<Box<dyn StreamSession>>,
    events: &mut EventLog,
    energy_limit: f64,
) -> Result<(), SimulationError> {
    let step = state.step_count;
    check_state(state.engine.total_energy()?, energy_limit)?;
    let frame = state.engine.frame()?;
    let snapshot = state.engine.snapshot_state()?;

    state.last_verified = Some(VerifiedSnapshot {
        step,
        state: snapshot,
    });
    state.last_frame_step = step;
    state.frames_emitted += 1;
    events.log(Event::FrameEmitted {
        step,
        frame: state.frames_emitted,
    });

    if let Some(session) = session.as_mut() {
        let body = UploadBody::frame(artifacts::encode(&frame));
        if let Err(e) = session.send_frame(&body) {
            state.frames_failed += 1;
            warn!(step, error = %e, "frame upload failed");
            events.log(Event::FrameUploadFailed {
                step,
                reason: e.to_string(),
            });
        }
    }
    Ok(())
}

fn frames_since_checkpoint(state: &SimulationState, step: u64) -> f64 {
    step.saturating_sub(state.last_checkpoint_step) as f64 / state.frame_interval.max(1) as f64
}

fn take_artifact(set: &mut ArtifactSet, name: &str) -> Result<Vec<u8>, ProtocolError> {
    set.take(decoded_name(name))
        .ok_or_else(|| ProtocolError::MissingArtifact {
            name: name.to_string(),
        })
}
