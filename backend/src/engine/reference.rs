//! Reference engine
//!
//! A deterministic set of independent 1-D harmonic oscillators integrated with
//! velocity Verlet. All three inputs are JSON:
//!
//! ```text
//! system:     {"masses": [1.0, 2.0], "spring_constants": [4.0, 1.0]}
//! integrator: {"step_size_ps": 0.002}
//! state:      {"positions": [0.1, 0.0], "velocities": [0.0, 0.3], "time_ps": 0.0}
//! ```

use crate::engine::{EngineBackend, EngineContext, EngineError};
use serde::{Deserialize, Serialize};

pub const ENGINE_NAME: &str = "reference";
pub const ENGINE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemDefinition {
    pub masses: Vec<f64>,
    pub spring_constants: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegratorDefinition {
    pub step_size_ps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillatorState {
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    #[serde(default)]
    pub time_ps: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceBackend;

impl ReferenceBackend {
    pub fn new() -> Self {
        Self
    }
}

impl EngineBackend for ReferenceBackend {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn version(&self) -> &str {
        ENGINE_VERSION
    }

    fn initialize(
        &self,
        system: &[u8],
        integrator: &[u8],
    ) -> Result<Box<dyn EngineContext>, EngineError> {
        let system: SystemDefinition = serde_json::from_slice(system)
            .map_err(|e| EngineError::Initialization(format!("system: {}", e)))?;
        let integrator: IntegratorDefinition = serde_json::from_slice(integrator)
            .map_err(|e| EngineError::Initialization(format!("integrator: {}", e)))?;

        if system.masses.len() != system.spring_constants.len() {
            return Err(EngineError::Initialization(format!(
                "{} masses but {} spring constants",
                system.masses.len(),
                system.spring_constants.len()
            )));
        }
        if system.masses.iter().any(|m| !(m.is_finite() && *m > 0.0)) {
            return Err(EngineError::Initialization(
                "masses must be finite and positive".to_string(),
            ));
        }
        if !(integrator.step_size_ps.is_finite() && integrator.step_size_ps > 0.0) {
            return Err(EngineError::Initialization(
                "step_size_ps must be finite and positive".to_string(),
            ));
        }

        let n = system.masses.len();
        Ok(Box::new(ReferenceContext {
            system,
            step_size_ps: integrator.step_size_ps,
            state: OscillatorState {
                positions: vec![0.0; n],
                velocities: vec![0.0; n],
                time_ps: 0.0,
            },
        }))
    }
}

#[derive(Debug)]
pub struct ReferenceContext {
    system: SystemDefinition,
    step_size_ps: f64,
    state: OscillatorState,
}

impl ReferenceContext {
    fn acceleration(&self, i: usize, x: f64) -> f64 {
        -self.system.spring_constants[i] * x / self.system.masses[i]
    }
}

impl EngineContext for ReferenceContext {
    fn set_state(&mut self, state: &[u8]) -> Result<(), EngineError> {
        let state: OscillatorState = serde_json::from_slice(state)
            .map_err(|e| EngineError::InvalidState(e.to_string()))?;
        let n = self.system.masses.len();
        if state.positions.len() != n || state.velocities.len() != n {
            return Err(EngineError::InvalidState(format!(
                "state has {} positions and {} velocities, system has {} particles",
                state.positions.len(),
                state.velocities.len(),
                n
            )));
        }
        self.state = state;
        Ok(())
    }

    fn step(&mut self, steps: u64) -> Result<(), EngineError> {
        let dt = self.step_size_ps;
        for _ in 0..steps {
            for i in 0..self.system.masses.len() {
                let x = self.state.positions[i];
                let v = self.state.velocities[i];
                let a = self.acceleration(i, x);
                let x_next = x + v * dt + 0.5 * a * dt * dt;
                let a_next = self.acceleration(i, x_next);
                self.state.positions[i] = x_next;
                self.state.velocities[i] = v + 0.5 * (a + a_next) * dt;
            }
            self.state.time_ps += dt;
        }
        Ok(())
    }

    fn snapshot_state(&self) -> Result<Vec<u8>, EngineError> {
        serde_json::to_vec(&self.state).map_err(|e| EngineError::InvalidState(e.to_string()))
    }

    fn total_energy(&self) -> Result<f64, EngineError> {
        let energy = self
            .system
            .masses
            .iter()
            .zip(&self.system.spring_constants)
            .zip(self.state.positions.iter().zip(&self.state.velocities))
            .map(|((m, k), (x, v))| 0.5 * m * v * v + 0.5 * k * x * x)
            .sum();
        Ok(energy)
    }

    fn step_size_ns(&self) -> f64 {
        self.step_size_ps / 1000.0
    }

    fn frame(&self) -> Result<Vec<u8>, EngineError> {
        serde_json::to_vec(&self.state.positions)
            .map_err(|e| EngineError::InvalidState(e.to_string()))
    }
}
