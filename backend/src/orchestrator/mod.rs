//! Orchestrator - run control loop
//!
//! The driver owns the state machine; checkpointing and throughput are split
//! out so they can be tested without a coordinator.

pub mod checkpoint;
pub mod driver;
pub mod throughput;

pub use checkpoint::{
    Ack, Checkpoint, CheckpointError, CheckpointManager, CheckpointUploadError, FlushOutcome,
    RetryPolicy,
};
pub use driver::{
    DriverConfig, ErrorCategory, RunPhase, RunSummary, SimulationDriver, SimulationError,
};
pub use throughput::{ProgressCounters, ThroughputMonitor, ThroughputReport};
