//! Shared fakes for driver and checkpoint tests
//!
//! - `ScriptedBackend`: engine whose every step advances a `ManualClock`
//! - `FakeCoordinator` / `FakeSession`: in-memory coordinator recording every
//!   upload, with injectable failures

#![allow(dead_code)]

use grid_worker_core::artifacts;
use grid_worker_core::engine::{EngineBackend, EngineContext, EngineError};
use grid_worker_core::models::{JobAssignment, JobDescriptor};
use grid_worker_core::net::wire;
use grid_worker_core::net::{
    Coordinator, CoordinatorError, EngineRequest, StreamSession, TransportError, UploadBody,
};
use grid_worker_core::orchestrator::{DriverConfig, RetryPolicy};
use grid_worker_core::trust::{TrustBundle, TrustLoadError};
use grid_worker_core::ManualClock;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Engine
// ============================================================================

/// Engine state is just the step counter, serialized as decimal text
pub struct ScriptedBackend {
    pub clock: ManualClock,
    pub step_cost: Duration,
    /// Energy turns NaN once this many steps have run
    pub fail_energy_at: Option<u64>,
}

impl ScriptedBackend {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            step_cost: Duration::from_millis(10),
            fail_energy_at: None,
        }
    }
}

impl EngineBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn version(&self) -> &str {
        "1"
    }

    fn initialize(
        &self,
        system: &[u8],
        integrator: &[u8],
    ) -> Result<Box<dyn EngineContext>, EngineError> {
        if system != b"system" || integrator != b"integrator" {
            return Err(EngineError::Initialization("unexpected inputs".to_string()));
        }
        Ok(Box::new(ScriptedContext {
            clock: self.clock.clone(),
            step_cost: self.step_cost,
            fail_energy_at: self.fail_energy_at,
            steps: 0,
        }))
    }
}

pub struct ScriptedContext {
    clock: ManualClock,
    step_cost: Duration,
    fail_energy_at: Option<u64>,
    steps: u64,
}

impl EngineContext for ScriptedContext {
    fn set_state(&mut self, state: &[u8]) -> Result<(), EngineError> {
        let text = std::str::from_utf8(state).map_err(|e| EngineError::InvalidState(e.to_string()))?;
        self.steps = text
            .trim()
            .parse()
            .map_err(|_| EngineError::InvalidState(format!("not a step count: {}", text)))?;
        Ok(())
    }

    fn step(&mut self, steps: u64) -> Result<(), EngineError> {
        for _ in 0..steps {
            self.clock.advance(self.step_cost);
        }
        self.steps += steps;
        Ok(())
    }

    fn snapshot_state(&self) -> Result<Vec<u8>, EngineError> {
        Ok(self.steps.to_string().into_bytes())
    }

    fn total_energy(&self) -> Result<f64, EngineError> {
        match self.fail_energy_at {
            Some(limit) if self.steps >= limit => Ok(f64::NAN),
            _ => Ok(-1.0e3),
        }
    }

    fn step_size_ns(&self) -> f64 {
        0.002
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Everything the fake coordinator received
#[derive(Debug, Default)]
pub struct Recorder {
    pub frames: Vec<Value>,
    pub checkpoints: Vec<Value>,
    pub heartbeats: usize,
    pub stops: Vec<Option<String>>,
    pub frame_failures: usize,
    pub checkpoint_failures: usize,
}

pub type SharedRecorder = Arc<Mutex<Recorder>>;

pub struct FakeCoordinator {
    pub recorder: SharedRecorder,
    pub descriptor_body: String,
    pub assign_error: Option<CoordinatorError>,
    pub trust_installed: usize,
    pub requests: Vec<EngineRequest>,
}

impl FakeCoordinator {
    pub fn new(descriptor_body: String) -> Self {
        Self {
            recorder: Arc::new(Mutex::new(Recorder::default())),
            descriptor_body,
            assign_error: None,
            trust_installed: 0,
            requests: Vec::new(),
        }
    }

    pub fn recorder(&self) -> std::sync::MutexGuard<'_, Recorder> {
        self.recorder.lock().unwrap()
    }

    /// Checkpoint steps in upload order, read back from the uploaded state
    pub fn checkpoint_steps(&self) -> Vec<u64> {
        self.recorder()
            .checkpoints
            .iter()
            .map(|body| {
                let blob = body["files"]["state.xml.gz.b64"].as_str().unwrap();
                let bytes = artifacts::decode(blob).unwrap();
                String::from_utf8(bytes).unwrap().parse().unwrap()
            })
            .collect()
    }
}

impl Coordinator for FakeCoordinator {
    fn install_trust(&mut self, bundle: TrustBundle) -> Result<usize, TrustLoadError> {
        self.trust_installed += bundle.len();
        Ok(bundle.len())
    }

    fn assign(&mut self, request: &EngineRequest) -> Result<JobAssignment, CoordinatorError> {
        self.requests.push(request.clone());
        if let Some(err) = self.assign_error.clone() {
            return Err(err);
        }
        Ok(wire::parse_assignment(
            r#"{"uri":"https://stream.test:8443/core/start","token":"tok-1"}"#,
        )?)
    }

    fn open_stream(
        &mut self,
        _assignment: &JobAssignment,
    ) -> Result<(JobDescriptor, Box<dyn StreamSession>), CoordinatorError> {
        let descriptor = wire::parse_descriptor(&self.descriptor_body)?;
        let session = FakeSession {
            recorder: Arc::clone(&self.recorder),
        };
        Ok((descriptor, Box::new(session)))
    }
}

pub struct FakeSession {
    pub recorder: SharedRecorder,
}

impl FakeSession {
    pub fn new(recorder: SharedRecorder) -> Self {
        Self { recorder }
    }
}

fn unreachable_coordinator() -> CoordinatorError {
    TransportError::Connect {
        url: "https://stream.test:8443".to_string(),
        message: "connection refused".to_string(),
    }
    .into()
}

impl StreamSession for FakeSession {
    fn send_frame(&mut self, body: &UploadBody) -> Result<(), CoordinatorError> {
        let mut recorder = self.recorder.lock().unwrap();
        if recorder.frame_failures > 0 {
            recorder.frame_failures -= 1;
            return Err(unreachable_coordinator());
        }
        recorder.frames.push(serde_json::from_str(body.json()).unwrap());
        Ok(())
    }

    fn send_checkpoint(&mut self, body: &UploadBody) -> Result<(), CoordinatorError> {
        let mut recorder = self.recorder.lock().unwrap();
        if recorder.checkpoint_failures > 0 {
            recorder.checkpoint_failures -= 1;
            return Err(unreachable_coordinator());
        }
        recorder
            .checkpoints
            .push(serde_json::from_str(body.json()).unwrap());
        Ok(())
    }

    fn heartbeat(&mut self) -> Result<(), CoordinatorError> {
        self.recorder.lock().unwrap().heartbeats += 1;
        Ok(())
    }

    fn stop(&mut self, error: Option<&str>) -> Result<(), CoordinatorError> {
        self.recorder
            .lock()
            .unwrap()
            .stops
            .push(error.map(str::to_string));
        Ok(())
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Descriptor carrying the inputs `ScriptedBackend` expects
pub fn descriptor_json(initial_step: u64) -> String {
    json!({
        "stream_id": "stream-7",
        "target_id": "target-3",
        "target_files": {
            "system.xml.gz.b64": artifacts::encode(b"system"),
            "integrator.xml.gz.b64": artifacts::encode(b"integrator"),
        },
        "stream_files": {
            "state.xml.gz.b64": artifacts::encode(initial_step.to_string().as_bytes()),
        },
    })
    .to_string()
}

/// target 1000, frame every 100 steps, checkpoint every 5 s, no heartbeats
pub fn test_config() -> DriverConfig {
    DriverConfig {
        target_steps: 1000,
        frame_interval: 100,
        checkpoint_interval: Duration::from_secs(5),
        heartbeat_interval: Duration::ZERO,
        max_steps_per_batch: 1000,
        energy_limit: 1.0e6,
        checkpoint_on_complete: true,
        checkpoint_retry: RetryPolicy {
            max_attempts: None,
            backoff_ms: 0,
        },
        artifacts: Default::default(),
    }
}
