//! Event logging for run auditing.
//!
//! Every significant transition of a run is recorded as an [`Event`]. The log
//! answers questions like "how many frames were emitted" or "how many upload
//! attempts did the second checkpoint need" without scraping log output.
//!
//! # Event Types
//!
//! - **Handshake**: assignment received, stream opened, engine initialized
//! - **Stepping**: step batches
//! - **Output**: frames, checkpoints, heartbeats
//! - **Terminal**: completed, failed
//!
//! # Example
//!
//! ```rust
//! use grid_worker_core::models::{Event, EventLog};
//!
//! let mut log = EventLog::new();
//! log.log(Event::FrameEmitted { step: 100, frame: 1 });
//! log.log(Event::FrameEmitted { step: 200, frame: 2 });
//! assert_eq!(log.count_of_type("frame_emitted"), 2);
//! ```

/// Run event capturing a state change.
///
/// Events carrying a `step` are ordered by it; handshake events happen before
/// stepping and report step 0.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Assign call returned a streaming server and token
    Assigned { host: String, port: u16 },

    /// Stream call returned the job descriptor
    StreamOpened {
        stream_id: String,
        target_id: String,
    },

    /// Engine built from decoded artifacts and loaded with the stream state
    EngineInitialized {
        stream_id: String,
        frame_interval: u64,
    },

    /// A batch of integration steps ran
    StepBatch { step: u64, steps: u64 },

    /// Verified frame produced at `step` (`frame` is 1-based within the run)
    FrameEmitted { step: u64, frame: u64 },

    /// Frame upload failed; the run continues
    FrameUploadFailed { step: u64, reason: String },

    /// Checkpoint placed in the pending slot
    CheckpointStaged { step: u64 },

    /// Coordinator acknowledged the pending checkpoint
    CheckpointUploaded { step: u64, attempts: u32 },

    /// Upload attempt failed; the checkpoint stays pending
    CheckpointUploadFailed {
        step: u64,
        attempt: u32,
        reason: String,
    },

    HeartbeatSent { step: u64 },

    HeartbeatFailed { step: u64, reason: String },

    /// Target step count reached
    Completed { step: u64 },

    /// Run entered the terminal failed phase
    Failed {
        step: u64,
        category: String,
        message: String,
    },
}

impl Event {
    /// Step at which the event happened
    pub fn step(&self) -> u64 {
        match self {
            Event::Assigned { .. } | Event::StreamOpened { .. } | Event::EngineInitialized { .. } => 0,
            Event::StepBatch { step, .. }
            | Event::FrameEmitted { step, .. }
            | Event::FrameUploadFailed { step, .. }
            | Event::CheckpointStaged { step }
            | Event::CheckpointUploaded { step, .. }
            | Event::CheckpointUploadFailed { step, .. }
            | Event::HeartbeatSent { step }
            | Event::HeartbeatFailed { step, .. }
            | Event::Completed { step }
            | Event::Failed { step, .. } => *step,
        }
    }

    /// Stable snake_case name of the variant
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Assigned { .. } => "assigned",
            Event::StreamOpened { .. } => "stream_opened",
            Event::EngineInitialized { .. } => "engine_initialized",
            Event::StepBatch { .. } => "step_batch",
            Event::FrameEmitted { .. } => "frame_emitted",
            Event::FrameUploadFailed { .. } => "frame_upload_failed",
            Event::CheckpointStaged { .. } => "checkpoint_staged",
            Event::CheckpointUploaded { .. } => "checkpoint_uploaded",
            Event::CheckpointUploadFailed { .. } => "checkpoint_upload_failed",
            Event::HeartbeatSent { .. } => "heartbeat_sent",
            Event::HeartbeatFailed { .. } => "heartbeat_failed",
            Event::Completed { .. } => "completed",
            Event::Failed { .. } => "failed",
        }
    }
}

/// Append-only log of run events
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Get events of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn count_of_type(&self, event_type: &str) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    /// Get events that happened at a specific step
    pub fn events_at_step(&self, step: u64) -> Vec<&Event> {
        self.events.iter().filter(|e| e.step() == step).collect()
    }
}
