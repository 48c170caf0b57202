//! Grid Worker Core
//!
//! Worker side of a distributed simulation grid: acquire a work unit from a
//! coordinator, drive an engine through it, report frames and durable
//! checkpoints back.
//!
//! # Architecture
//!
//! - **trust**: PEM bundle parsing and the trust store for coordinator TLS
//! - **net**: two-phase assignment handshake and the token-scoped session
//! - **artifacts**: `base64(gzip(bytes))` codec for job inputs and uploads
//! - **engine**: engine capability interface and the reference backend
//! - **orchestrator**: run state machine, checkpoints, throughput
//! - **models**: job records, run state, event log
//! - **core**: wall-clock abstraction
//! - **config**: JSON worker configuration
//!
//! # Critical Invariants
//!
//! 1. At most one checkpoint is pending, and stepping halts while it is
//! 2. Failed is terminal and sticky
//! 3. Decoding yields exact bytes or an error, never a truncated buffer

// Module declarations
pub mod artifacts;
pub mod config;
pub mod core;
pub mod engine;
pub mod models;
pub mod net;
pub mod orchestrator;
pub mod trust;

// Re-exports for convenience
pub use artifacts::{ArtifactNames, ArtifactSet, DecodeError};
pub use config::{ConfigError, WorkerConfig};
pub use core::time::{ManualClock, SystemClock, WallClock};
pub use engine::{create_backend, EngineBackend, EngineConfig, EngineContext, EngineError};
pub use models::{Event, EventLog, JobAssignment, JobDescriptor, SimulationState};
pub use net::{
    Coordinator, CoordinatorError, HttpCoordinator, ProtocolError, StreamSession, TransportError,
};
pub use orchestrator::{
    Checkpoint, CheckpointManager, DriverConfig, ErrorCategory, RetryPolicy, RunPhase, RunSummary,
    SimulationDriver, SimulationError, ThroughputMonitor,
};
pub use trust::{TrustBundle, TrustLoadError, TrustStore};
