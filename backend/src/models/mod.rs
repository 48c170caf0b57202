//! Domain types of a run
//!
//! - **job**: assignment and descriptor produced by the handshake
//! - **state**: progress counters and the owned engine context
//! - **event**: audit log of run transitions

pub mod event;
pub mod job;
pub mod state;

pub use event::{Event, EventLog};
pub use job::{JobAssignment, JobDescriptor, JobOptions};
pub use state::{SimulationState, VerifiedSnapshot};
