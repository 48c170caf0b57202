//! Worker configuration
//!
//! Loaded from a JSON file; every field has a default so a minimal file (or
//! none at all) is a valid configuration. Command-line flags are applied on
//! top of the loaded value before [`WorkerConfig::validate`] runs.
//!
//! ```json
//! {
//!   "coordinator": { "url": "https://coordinator.example.org", "trust_bundle": "roots.pem" },
//!   "run": { "target_steps": 1000000, "checkpoint_interval_secs": 300 },
//!   "engine": { "backend": "reference" }
//! }
//! ```

use crate::artifacts::ArtifactNames;
use crate::engine::EngineConfig;
use crate::net::HttpSettings;
use crate::orchestrator::{DriverConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete worker configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub coordinator: CoordinatorConfig,
    pub run: RunConfig,
    pub engine: EngineConfig,
}

/// Where the coordinator lives and how to reach it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// PEM bundle replacing the built-in roots
    pub trust_bundle: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            url: "https://127.0.0.1:8980".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
            trust_bundle: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Run control parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub target_steps: u64,
    pub frame_interval_steps: u64,
    pub checkpoint_interval_secs: u64,
    /// Zero disables heartbeats
    pub heartbeat_interval_secs: u64,
    pub max_steps_per_batch: u64,
    pub energy_limit: f64,
    pub checkpoint_on_complete: bool,
    pub checkpoint_retry: RetryPolicy,
    pub artifacts: ArtifactNames,
}

impl Default for RunConfig {
    fn default() -> Self {
        let driver = DriverConfig::default();
        Self {
            target_steps: driver.target_steps,
            frame_interval_steps: driver.frame_interval,
            checkpoint_interval_secs: driver.checkpoint_interval.as_secs(),
            heartbeat_interval_secs: driver.heartbeat_interval.as_secs(),
            max_steps_per_batch: driver.max_steps_per_batch,
            energy_limit: driver.energy_limit,
            checkpoint_on_complete: driver.checkpoint_on_complete,
            checkpoint_retry: driver.checkpoint_retry,
            artifacts: driver.artifacts,
        }
    }
}

impl RunConfig {
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            target_steps: self.target_steps,
            frame_interval: self.frame_interval_steps,
            checkpoint_interval: Duration::from_secs(self.checkpoint_interval_secs),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            max_steps_per_batch: self.max_steps_per_batch,
            energy_limit: self.energy_limit,
            checkpoint_on_complete: self.checkpoint_on_complete,
            checkpoint_retry: self.checkpoint_retry.clone(),
            artifacts: self.artifacts.clone(),
        }
    }
}

impl WorkerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reject values the driver cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.coordinator.url;
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::Invalid(format!(
                "coordinator.url must be an http(s) URL, got '{}'",
                url
            )));
        }

        let run = &self.run;
        if run.target_steps == 0 {
            return Err(ConfigError::Invalid(
                "run.target_steps must be > 0".to_string(),
            ));
        }
        if run.frame_interval_steps == 0 {
            return Err(ConfigError::Invalid(
                "run.frame_interval_steps must be > 0".to_string(),
            ));
        }
        if run.max_steps_per_batch == 0 {
            return Err(ConfigError::Invalid(
                "run.max_steps_per_batch must be > 0".to_string(),
            ));
        }
        if run.checkpoint_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "run.checkpoint_interval_secs must be > 0".to_string(),
            ));
        }
        if !(run.energy_limit.is_finite() && run.energy_limit > 0.0) {
            return Err(ConfigError::Invalid(
                "run.energy_limit must be finite and > 0".to_string(),
            ));
        }
        if run.checkpoint_retry.max_attempts == Some(0) {
            return Err(ConfigError::Invalid(
                "run.checkpoint_retry.max_attempts must be > 0 when set".to_string(),
            ));
        }

        let names = &run.artifacts;
        for (field, name) in [
            ("system", &names.system),
            ("integrator", &names.integrator),
            ("state", &names.state),
        ] {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "run.artifacts.{} must not be empty",
                    field
                )));
            }
        }

        Ok(())
    }
}
