//! Checkpoint - durable upload of resumable simulation state
//!
//! A checkpoint is serialized completely when it is constructed: the engine
//! snapshot is encoded, wrapped in the upload body and digested. Uploading
//! only ever sends that finished body, so the coordinator never sees a
//! partially serialized checkpoint.
//!
//! # Critical Invariants
//!
//! - **Single flight**: at most one checkpoint is pending at any instant
//! - **No silent drops**: a failed upload keeps the checkpoint for retry;
//!   it is only released by an acknowledgement or by exhausting the caller's
//!   retry policy, and the latter surfaces as an error
//! - **Immutability**: a staged checkpoint is never modified, only replaced
//!   after it resolved

use crate::artifacts;
use crate::net::{CoordinatorError, StreamSession, UploadBody};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Checkpoint
// ============================================================================

/// Fully serialized, immutable checkpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    step: u64,
    /// Frames (fractional) completed since the previous checkpoint
    frames: f64,
    state_file: String,
    body: UploadBody,
    /// SHA-256 of the upload body
    digest: String,
}

impl Checkpoint {
    /// Serialize `state` captured at `step`
    pub fn new(step: u64, frames: f64, state_file: &str, state: &[u8]) -> Self {
        let body = UploadBody::checkpoint(state_file, artifacts::encode(state), frames);
        let digest = compute_digest(body.json().as_bytes());
        Self {
            step,
            frames,
            state_file: state_file.to_string(),
            body,
            digest,
        }
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn frames(&self) -> f64 {
        self.frames
    }

    pub fn state_file(&self) -> &str {
        &self.state_file
    }

    pub fn body(&self) -> &UploadBody {
        &self.body
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

/// Lowercase hex SHA-256 of `bytes`
pub fn compute_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Upload
// ============================================================================

/// Coordinator acknowledged a checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub step: u64,
    pub digest: String,
    pub attempts: u32,
}

/// Upload failed; the checkpoint is handed back untouched
#[derive(Debug, Error)]
#[error(
    "checkpoint at step {} failed after {attempts} attempt(s): {source}",
    .checkpoint.step()
)]
pub struct CheckpointUploadError {
    pub checkpoint: Checkpoint,
    pub attempts: u32,
    #[source]
    pub source: CoordinatorError,
}

/// Staging would break the single-flight invariant
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("checkpoint at step {pending} is still pending; cannot stage step {rejected}")]
    AlreadyPending { pending: u64, rejected: u64 },
}

/// Send one checkpoint synchronously
///
/// On failure the same checkpoint comes back inside the error so the caller
/// can retry it without re-serializing.
pub fn upload(
    session: &mut dyn StreamSession,
    checkpoint: Checkpoint,
) -> Result<Ack, CheckpointUploadError> {
    match session.send_checkpoint(checkpoint.body()) {
        Ok(()) => Ok(Ack {
            step: checkpoint.step,
            digest: checkpoint.digest,
            attempts: 1,
        }),
        Err(source) => Err(CheckpointUploadError {
            checkpoint,
            attempts: 1,
            source,
        }),
    }
}

/// How long to keep retrying a failed upload
///
/// `max_attempts: None` retries forever; the run blocks rather than stepping
/// on with an unsaved checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempts` failures
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

// ============================================================================
// Manager
// ============================================================================

#[derive(Debug)]
struct PendingCheckpoint {
    checkpoint: Checkpoint,
    attempts: u32,
}

/// Result of one flush attempt
#[derive(Debug)]
pub enum FlushOutcome {
    /// Nothing was pending
    Idle,
    /// Pending checkpoint acknowledged and released
    Acknowledged(Ack),
    /// Attempt failed; the checkpoint is still pending
    Retrying {
        step: u64,
        attempt: u32,
        error: CoordinatorError,
    },
}

/// Owner of the single pending checkpoint slot
#[derive(Debug, Default)]
pub struct CheckpointManager {
    retry: RetryPolicy,
    pending: Option<PendingCheckpoint>,
    last_ack: Option<Ack>,
    uploads: u64,
}

impl CheckpointManager {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            ..Self::default()
        }
    }

    /// Place `checkpoint` in the pending slot
    pub fn stage(&mut self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        if let Some(pending) = &self.pending {
            return Err(CheckpointError::AlreadyPending {
                pending: pending.checkpoint.step,
                rejected: checkpoint.step,
            });
        }
        self.pending = Some(PendingCheckpoint {
            checkpoint,
            attempts: 0,
        });
        Ok(())
    }

    /// Try to upload the pending checkpoint once
    pub fn flush(
        &mut self,
        session: &mut dyn StreamSession,
    ) -> Result<FlushOutcome, CheckpointUploadError> {
        let Some(pending) = self.pending.take() else {
            return Ok(FlushOutcome::Idle);
        };
        let attempts = pending.attempts + 1;

        match upload(session, pending.checkpoint) {
            Ok(ack) => {
                let ack = Ack { attempts, ..ack };
                self.uploads += 1;
                self.last_ack = Some(ack.clone());
                Ok(FlushOutcome::Acknowledged(ack))
            }
            Err(failed) if self.retry.allows_retry(attempts) => {
                let step = failed.checkpoint.step;
                self.pending = Some(PendingCheckpoint {
                    checkpoint: failed.checkpoint,
                    attempts,
                });
                Ok(FlushOutcome::Retrying {
                    step,
                    attempt: attempts,
                    error: failed.source,
                })
            }
            Err(failed) => Err(CheckpointUploadError {
                attempts,
                ..failed
            }),
        }
    }

    /// Upload `checkpoint` once, outside the pending slot
    ///
    /// Used for a final best-effort upload; an acknowledgement is counted
    /// like a flushed one, a failure is handed back without retrying.
    pub fn upload_once(
        &mut self,
        session: &mut dyn StreamSession,
        checkpoint: Checkpoint,
    ) -> Result<Ack, CheckpointUploadError> {
        let ack = upload(session, checkpoint)?;
        self.uploads += 1;
        self.last_ack = Some(ack.clone());
        Ok(ack)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&Checkpoint> {
        self.pending.as_ref().map(|p| &p.checkpoint)
    }

    /// Failed attempts so far for the pending checkpoint
    pub fn pending_attempts(&self) -> u32 {
        self.pending.as_ref().map_or(0, |p| p.attempts)
    }

    pub fn last_ack(&self) -> Option<&Ack> {
        self.last_ack.as_ref()
    }

    /// Number of acknowledged uploads
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}
