//! Transaction Lifecycle Tests
//!
//! Tests for the client state machine:
//! - Begin-commit and begin-abort cycles
//! - Announce / retract primitives
//! - Transport failures
//! - Read contexts

use deferkv::{
    ClientConfig, Error, ReadContext, ReadStats, Store, TransactionClient, TransactionPayload,
    TransactionStatus,
};
use std::sync::Arc;

use crate::common::*;

// ============================================================================
// Begin-Commit Cycle
// ============================================================================

#[test]
fn begin_commit_stores_payload_under_id() {
    let (store, mut client) = memory_client();
    let id = client.id();

    client.begin().unwrap();
    client.put("w-1-ytd", "100.0").unwrap();
    client.commit().unwrap();

    assert_eq!(client.status(), &TransactionStatus::Committed);
    let raw = store.get(&id.to_key()).unwrap().unwrap();
    let payload = TransactionPayload::from_bytes(&raw).unwrap();
    assert_eq!(payload.transaction_id, id.to_key());
    assert_eq!(payload.read_write_set.len(), 1);
    assert_eq!(payload.read_write_set[0].key, "w-1-ytd");
}

#[test]
fn committed_transaction_is_kept_as_previous() {
    let (_, mut client) = memory_client();
    client.begin().unwrap();
    client.put("a", "1").unwrap();
    client.commit().unwrap();

    let previous = client.previous().unwrap();
    assert_eq!(previous.id.sequence, 1);
    assert!(previous.rwset.contains("a"));
    assert!(client.transaction().rwset.is_empty());
}

#[test]
fn read_only_transaction_commits() {
    let (store, mut client) = memory_client();
    seed(&*store, &[("a", "1")]);

    client.begin().unwrap();
    client.get("a").unwrap();
    assert!(client.transaction().is_read_only());
    client.commit().unwrap();
    assert_eq!(client.id().sequence, 2);
}

// ============================================================================
// Begin-Abort Cycle
// ============================================================================

#[test]
fn abort_retracts_announce_and_advances() {
    let (store, mut client) = scripted_client();
    let key = client.id().to_key();

    client.begin().unwrap();
    client.put("a", "1").unwrap();
    client.abort().unwrap();

    assert_eq!(store.calls(), vec![Call::Incr(key.clone()), Call::Decr(key)]);
    assert_eq!(client.status(), &TransactionStatus::Idle);
    assert_eq!(client.id().sequence, 2);
    assert!(client.transaction().rwset.is_empty());
}

#[test]
fn abort_when_idle_is_invalid() {
    let (_, mut client) = memory_client();
    let err = client.abort().unwrap_err();
    assert!(matches!(err, Error::InvalidState { operation: "abort", .. }));
}

#[test]
fn operations_require_active_transaction() {
    let (_, mut client) = memory_client();
    assert!(client.commit().unwrap_err().is_precondition());
    assert!(client.put("a", "1").unwrap_err().is_precondition());
    assert!(client.get_deferred("a").unwrap_err().is_precondition());

    client.begin().unwrap();
    client.commit().unwrap();
    // Committed is not Active
    assert!(matches!(
        client.get("a").unwrap_err(),
        Error::InvalidState { operation: "get", .. }
    ));
}

// ============================================================================
// Announce
// ============================================================================

#[test]
fn announce_precedes_commit() {
    let (store, mut client) = scripted_client();
    let key = client.id().to_key();

    client.begin().unwrap();
    client.put("a", "1").unwrap();
    client.commit().unwrap();

    assert_eq!(store.calls(), vec![Call::Incr(key.clone()), Call::Add(key)]);
}

#[test]
fn announce_can_be_disabled() {
    let store = Arc::new(ScriptedStore::new());
    let config = ClientConfig {
        announce: false,
        ..ClientConfig::default()
    };
    let mut client = TransactionClient::with_config(Arc::clone(&store), config);

    client.begin().unwrap();
    client.abort().unwrap();
    assert!(store.calls().is_empty());
}

// ============================================================================
// Transport Failures
// ============================================================================

#[test]
fn commit_transport_error_is_fatal_and_finishes_attempt() {
    let mut client = TransactionClient::new(FailingStore::new(FailOn::Commit));
    client.begin().unwrap();
    client.put("a", "1").unwrap();

    let err = client.commit().unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::Connection(_))));
    assert!(!err.is_retryable());
    assert_eq!(client.status(), &TransactionStatus::Idle);
    assert_eq!(client.id().sequence, 2);
    assert!(!client.is_retrying());
}

#[test]
fn announce_failure_leaves_client_idle() {
    let mut client = TransactionClient::new(FailingStore::new(FailOn::Announce));
    assert!(matches!(client.begin().unwrap_err(), Error::Store(_)));
    assert_eq!(client.status(), &TransactionStatus::Idle);
    assert_eq!(client.id().sequence, 1);
}

#[test]
fn read_transport_error_surfaces() {
    let config = ClientConfig {
        announce: false,
        ..ClientConfig::default()
    };
    let mut client = TransactionClient::with_config(FailingStore::new(FailOn::All), config);
    client.begin().unwrap();
    assert!(matches!(client.get("a").unwrap_err(), Error::Store(_)));
    assert!(!client.transaction().rwset.contains("a"));
}

// ============================================================================
// Read Contexts
// ============================================================================

#[test]
fn reads_carry_their_context() {
    let (store, mut client) = memory_client();
    seed(&*store, &[("a", "1"), ("item-1-price", "9.99")]);
    let id = client.id();

    client.begin().unwrap();
    client.get("a").unwrap();
    assert_eq!(
        store.last_read_context(),
        Some(ReadContext::transactional(&id))
    );

    assert_eq!(client.get_notxn("item-1-price").unwrap(), b"9.99".to_vec());
    assert_eq!(store.last_read_context(), Some(ReadContext::untracked(&id)));
    assert_eq!(
        store.read_stats(),
        ReadStats {
            tracked: 1,
            untracked: 1,
            bare: 0
        }
    );
    assert!(!client.transaction().rwset.contains("item-1-price"));
}

#[test]
fn notxn_read_works_outside_transaction() {
    let (store, client) = memory_client();
    seed(&*store, &[("a", "1"), ("b", "2")]);

    let values = client.multiget_notxn(&["a", "b"]).unwrap();
    assert_eq!(values["b"], b"2".to_vec());

    let err = client.get_notxn("missing").unwrap_err();
    assert!(matches!(err, Error::MissingKey { ref key } if key == "missing"));
    assert!(err.is_precondition());
}

#[test]
fn absent_key_reads_as_absent() {
    let (_, mut client) = memory_client();
    client.begin().unwrap();
    let result = client.get("nothing").unwrap();
    assert!(!result.existed);
    assert_eq!(result.value(), None);
}
