//! Checkpoint Tests - staging, upload and retry
//!
//! Critical invariants tested:
//! - Single flight: a second checkpoint cannot be staged while one is pending
//! - No silent drops: failed uploads keep the checkpoint; exhaustion returns it
//! - Serialize then send: the uploaded body decodes back to the staged state

mod common;

use common::{FakeSession, Recorder};
use grid_worker_core::artifacts;
use grid_worker_core::net::wire::content_md5;
use grid_worker_core::orchestrator::checkpoint::{self, compute_digest};
use grid_worker_core::orchestrator::{
    Checkpoint, CheckpointError, CheckpointManager, FlushOutcome, RetryPolicy,
};
use std::sync::{Arc, Mutex};

// ============================================================================
// Test Helpers
// ============================================================================

const STATE_FILE: &str = "state.xml.gz.b64";

fn recorder_with_failures(checkpoint_failures: usize) -> Arc<Mutex<Recorder>> {
    Arc::new(Mutex::new(Recorder {
        checkpoint_failures,
        ..Recorder::default()
    }))
}

fn bounded(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts: Some(max_attempts),
        backoff_ms: 0,
    }
}

// ============================================================================
// Checkpoint construction
// ============================================================================

#[test]
fn test_body_carries_encoded_state() {
    let checkpoint = Checkpoint::new(500, 5.0, STATE_FILE, b"<State step=\"500\"/>");

    let body: serde_json::Value = serde_json::from_str(checkpoint.body().json()).unwrap();
    let blob = body["files"][STATE_FILE].as_str().unwrap();
    assert_eq!(artifacts::decode(blob).unwrap(), b"<State step=\"500\"/>");
    assert_eq!(body["frames"], serde_json::json!(5.0));
}

#[test]
fn test_body_digests() {
    let checkpoint = Checkpoint::new(500, 5.0, STATE_FILE, b"state");

    assert_eq!(
        checkpoint.digest(),
        compute_digest(checkpoint.body().json().as_bytes())
    );
    assert_eq!(
        checkpoint.body().md5(),
        content_md5(checkpoint.body().json().as_bytes())
    );
}

#[test]
fn test_compute_digest_known_vector() {
    assert_eq!(
        compute_digest(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

// ============================================================================
// Free upload
// ============================================================================

#[test]
fn test_upload_acknowledged() {
    let recorder = recorder_with_failures(0);
    let mut session = FakeSession::new(Arc::clone(&recorder));
    let checkpoint = Checkpoint::new(100, 1.0, STATE_FILE, b"s");
    let digest = checkpoint.digest().to_string();

    let ack = checkpoint::upload(&mut session, checkpoint).unwrap();

    assert_eq!(ack.step, 100);
    assert_eq!(ack.digest, digest);
    assert_eq!(ack.attempts, 1);
    assert_eq!(recorder.lock().unwrap().checkpoints.len(), 1);
}

#[test]
fn test_upload_failure_returns_same_checkpoint() {
    let recorder = recorder_with_failures(1);
    let mut session = FakeSession::new(Arc::clone(&recorder));
    let checkpoint = Checkpoint::new(100, 1.0, STATE_FILE, b"s");
    let original = checkpoint.clone();

    let err = checkpoint::upload(&mut session, checkpoint).unwrap_err();

    assert_eq!(err.checkpoint, original);
    assert_eq!(err.attempts, 1);
    assert!(recorder.lock().unwrap().checkpoints.is_empty());
}

// ============================================================================
// Manager
// ============================================================================

#[test]
fn test_flush_idle_without_pending() {
    let mut manager = CheckpointManager::default();
    let mut session = FakeSession::new(recorder_with_failures(0));

    assert!(matches!(manager.flush(&mut session).unwrap(), FlushOutcome::Idle));
    assert_eq!(manager.uploads(), 0);
}

#[test]
fn test_flush_acknowledges_and_clears_slot() {
    let recorder = recorder_with_failures(0);
    let mut session = FakeSession::new(Arc::clone(&recorder));
    let mut manager = CheckpointManager::default();
    let checkpoint = Checkpoint::new(500, 5.0, STATE_FILE, b"s");
    let digest = checkpoint.digest().to_string();
    manager.stage(checkpoint).unwrap();

    match manager.flush(&mut session).unwrap() {
        FlushOutcome::Acknowledged(ack) => {
            assert_eq!(ack.step, 500);
            assert_eq!(ack.attempts, 1);
        }
        other => panic!("expected acknowledgement, got {:?}", other),
    }
    assert!(!manager.is_pending());
    assert_eq!(manager.uploads(), 1);
    assert_eq!(manager.last_ack().unwrap().digest, digest);
}

#[test]
fn test_upload_once_counts_acknowledgement() {
    let recorder = recorder_with_failures(0);
    let mut session = FakeSession::new(Arc::clone(&recorder));
    let mut manager = CheckpointManager::default();

    let ack = manager
        .upload_once(&mut session, Checkpoint::new(200, 2.0, STATE_FILE, b"s"))
        .unwrap();

    assert_eq!(ack.step, 200);
    assert!(!manager.is_pending());
    assert_eq!(manager.uploads(), 1);
    assert_eq!(manager.last_ack(), Some(&ack));
}

#[test]
fn test_upload_once_failure_is_not_counted() {
    let recorder = recorder_with_failures(1);
    let mut session = FakeSession::new(Arc::clone(&recorder));
    let mut manager = CheckpointManager::default();

    let err = manager
        .upload_once(&mut session, Checkpoint::new(200, 2.0, STATE_FILE, b"s"))
        .unwrap_err();

    assert_eq!(err.checkpoint.step(), 200);
    assert!(!manager.is_pending());
    assert_eq!(manager.uploads(), 0);
    assert!(manager.last_ack().is_none());
}

#[test]
fn test_failed_flush_keeps_checkpoint_pending() {
    let recorder = recorder_with_failures(2);
    let mut session = FakeSession::new(Arc::clone(&recorder));
    let mut manager = CheckpointManager::default();
    manager
        .stage(Checkpoint::new(500, 5.0, STATE_FILE, b"s"))
        .unwrap();

    for expected_attempt in 1..=2 {
        match manager.flush(&mut session).unwrap() {
            FlushOutcome::Retrying { step, attempt, .. } => {
                assert_eq!(step, 500);
                assert_eq!(attempt, expected_attempt);
            }
            other => panic!("expected retry, got {:?}", other),
        }
        assert!(manager.is_pending());
        assert_eq!(manager.pending_attempts(), expected_attempt);
    }

    match manager.flush(&mut session).unwrap() {
        FlushOutcome::Acknowledged(ack) => assert_eq!(ack.attempts, 3),
        other => panic!("expected acknowledgement, got {:?}", other),
    }
    assert_eq!(recorder.lock().unwrap().checkpoints.len(), 1);
}

#[test]
fn test_pending_blocks_staging() {
    let mut manager = CheckpointManager::default();
    let mut session = FakeSession::new(recorder_with_failures(1));
    manager
        .stage(Checkpoint::new(500, 5.0, STATE_FILE, b"a"))
        .unwrap();
    manager.flush(&mut session).unwrap();

    let err = manager
        .stage(Checkpoint::new(1000, 5.0, STATE_FILE, b"b"))
        .unwrap_err();

    assert!(matches!(
        err,
        CheckpointError::AlreadyPending {
            pending: 500,
            rejected: 1000
        }
    ));
    assert_eq!(manager.pending().unwrap().step(), 500);
}

#[test]
fn test_exhausted_retries_abandon_checkpoint() {
    let mut manager = CheckpointManager::new(bounded(2));
    let mut session = FakeSession::new(recorder_with_failures(5));
    let checkpoint = Checkpoint::new(500, 5.0, STATE_FILE, b"s");
    let original = checkpoint.clone();
    manager.stage(checkpoint).unwrap();

    assert!(matches!(
        manager.flush(&mut session).unwrap(),
        FlushOutcome::Retrying { attempt: 1, .. }
    ));
    let err = manager.flush(&mut session).unwrap_err();

    assert_eq!(err.attempts, 2);
    assert_eq!(err.checkpoint, original);
    assert!(!manager.is_pending());
    assert!(manager.last_ack().is_none());

    // Slot is free again once the failure surfaced
    manager
        .stage(Checkpoint::new(1000, 5.0, STATE_FILE, b"t"))
        .unwrap();
}
