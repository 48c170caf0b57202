//! Simulation engine capability interface
//!
//! The driver never knows which backend it runs. A backend is selected once
//! from [`EngineConfig`] and produces an exclusively owned [`EngineContext`]
//! for the run; dropping the context releases whatever the backend acquired.
//!
//! ```text
//! EngineConfig ──create_backend──▶ Box<dyn EngineBackend>
//!                                        │ initialize(system, integrator)
//!                                        ▼
//!                                 Box<dyn EngineContext>
//!                                   set_state / step / snapshot_state
//!                                   total_energy / frame
//! ```

pub mod reference;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use reference::ReferenceBackend;

/// Errors raised by an engine backend or by state verification
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("engine initialization failed: {0}")]
    Initialization(String),

    #[error("invalid engine state: {0}")]
    InvalidState(String),

    #[error("engine step failed: {0}")]
    Step(String),

    #[error("energy {energy} is not finite or exceeds limit {limit}")]
    InvalidEnergy { energy: f64, limit: f64 },
}

/// Factory for engine contexts, one per backend
pub trait EngineBackend: Send {
    /// Engine name reported to the coordinator when requesting work
    fn name(&self) -> &str;

    /// Engine version reported to the coordinator
    fn version(&self) -> &str;

    /// Build a context from the decoded system and integrator definitions
    fn initialize(
        &self,
        system: &[u8],
        integrator: &[u8],
    ) -> Result<Box<dyn EngineContext>, EngineError>;
}

/// A live simulation owned by exactly one run
pub trait EngineContext: Send {
    /// Replace the dynamic state with a serialized snapshot
    fn set_state(&mut self, state: &[u8]) -> Result<(), EngineError>;

    /// Advance the simulation by `steps` integration steps (blocking)
    fn step(&mut self, steps: u64) -> Result<(), EngineError>;

    /// Serialize the full resumable state
    fn snapshot_state(&self) -> Result<Vec<u8>, EngineError>;

    /// Total energy of the current state
    fn total_energy(&self) -> Result<f64, EngineError>;

    /// Integration step size in nanoseconds
    fn step_size_ns(&self) -> f64;

    /// Lightweight progress payload for a frame
    fn frame(&self) -> Result<Vec<u8>, EngineError> {
        self.snapshot_state()
    }
}

/// Verify that an energy sample is usable
///
/// Non-finite values and magnitudes above `limit` mean the state is corrupt.
/// Such a state cannot be trusted to recover, so callers treat this as fatal.
pub fn check_state(energy: f64, limit: f64) -> Result<(), EngineError> {
    if energy.is_finite() && energy.abs() <= limit {
        Ok(())
    } else {
        Err(EngineError::InvalidEnergy { energy, limit })
    }
}

/// Backend selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum EngineConfig {
    /// Deterministic harmonic-oscillator engine
    Reference,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::Reference
    }
}

/// Construct the backend named by `config`
pub fn create_backend(config: &EngineConfig) -> Box<dyn EngineBackend> {
    match config {
        EngineConfig::Reference => Box::new(ReferenceBackend::new()),
    }
}
