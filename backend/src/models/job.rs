//! Job handshake records
//!
//! [`JobAssignment`] comes out of the assign call and authorizes exactly one
//! streaming session. [`JobDescriptor`] comes out of the stream call and is
//! consumed by engine initialization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where and how to open the streaming session for one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAssignment {
    /// `https` in production, `http` against local test coordinators
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Path (and query, if any) of the stream endpoint
    pub path: String,
    /// Bearer token sent verbatim in the `Authorization` header
    pub token: String,
}

impl JobAssignment {
    /// `scheme://host:port` of the streaming server
    pub fn origin(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Absolute URL of the stream endpoint
    pub fn stream_url(&self) -> String {
        format!("{}{}", self.origin(), self.path)
    }

    /// Absolute URL of another endpoint on the same streaming server
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.origin(), path)
    }
}

/// Optional per-target settings sent with the descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Overrides the configured frame interval when present
    pub steps_per_frame: Option<u64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

/// Everything the coordinator hands over for one work unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub stream_id: String,
    pub target_id: String,
    /// Artifacts shared by every stream of the target (system, integrator)
    pub target_files: BTreeMap<String, String>,
    /// Artifacts specific to this stream (latest state)
    pub stream_files: BTreeMap<String, String>,
    #[serde(default)]
    pub options: JobOptions,
}
