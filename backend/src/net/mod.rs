//! Coordinator protocol
//!
//! The handshake is two strictly ordered calls:
//!
//! ```text
//! POST /core/assign  {"engine", "engine_version"}  → {"uri", "token"}
//! GET  <uri>         Authorization: <token>        → job descriptor
//! ```
//!
//! The second call yields a [`StreamSession`] scoped to the token. Frames,
//! checkpoints, heartbeats and the final stop all go through that session.
//!
//! Errors are split into [`TransportError`] (the request never produced a
//! response: refused, timed out, TLS rejected) and [`ProtocolError`] (a
//! response arrived but was not what the protocol requires).

pub mod http;
pub mod wire;

use crate::models::{JobAssignment, JobDescriptor};
use crate::trust::{TrustBundle, TrustLoadError};
use serde::Serialize;
use thiserror::Error;

pub use http::{HttpCoordinator, HttpSettings, HttpStreamSession};
pub use wire::UploadBody;

/// Request never produced a usable response
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("TLS failure talking to {url}: {message}")]
    Tls { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("cannot connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("transport error talking to {url}: {message}")]
    Io { url: String, message: String },
}

/// Response arrived but violates the protocol
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{url} answered HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("malformed {context} body: {message}")]
    MalformedBody {
        context: &'static str,
        message: String,
    },

    #[error("response is missing field '{field}'")]
    MissingField { field: &'static str },

    #[error("response field '{field}' is invalid: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },

    #[error("invalid stream uri '{uri}': {message}")]
    InvalidUri { uri: String, message: String },

    #[error("job descriptor has no artifact '{name}'")]
    MissingArtifact { name: String },
}

/// Any failure of a coordinator call
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Body of the assign call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineRequest {
    pub engine: String,
    pub engine_version: String,
}

impl EngineRequest {
    pub fn new(engine: impl Into<String>, engine_version: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            engine_version: engine_version.into(),
        }
    }
}

/// Handshake side of the coordinator
pub trait Coordinator {
    /// Replace the roots trusted for every later connection
    ///
    /// Returns the number of installed certificates. On error nothing changes.
    fn install_trust(&mut self, bundle: TrustBundle) -> Result<usize, TrustLoadError>;

    /// Phase 1: request an engine assignment
    fn assign(&mut self, request: &EngineRequest) -> Result<JobAssignment, CoordinatorError>;

    /// Phase 2: fetch the job descriptor and open the token-scoped session
    fn open_stream(
        &mut self,
        assignment: &JobAssignment,
    ) -> Result<(JobDescriptor, Box<dyn StreamSession>), CoordinatorError>;
}

/// Token-scoped reporting channel of one work unit
pub trait StreamSession: Send {
    fn send_frame(&mut self, body: &UploadBody) -> Result<(), CoordinatorError>;

    fn send_checkpoint(&mut self, body: &UploadBody) -> Result<(), CoordinatorError>;

    fn heartbeat(&mut self) -> Result<(), CoordinatorError>;

    /// Release the stream, optionally reporting why the run failed
    fn stop(&mut self, error: Option<&str>) -> Result<(), CoordinatorError>;
}
