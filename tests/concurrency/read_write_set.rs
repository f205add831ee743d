//! Read/Write Set Tests
//!
//! Each key is accessed at most once per transaction; a read followed by a
//! write collapses into one READ_WRITE entry.

use deferkv::{AccessKind, Error, ReadPayload, WriteOp, WriteValue};
use proptest::prelude::*;

use crate::common::*;

// ============================================================================
// Duplicate Access
// ============================================================================

#[test]
fn get_twice_is_duplicate_access() {
    let (store, mut client) = memory_client();
    seed(&*store, &[("a", "1")]);
    client.begin().unwrap();
    client.get("a").unwrap();

    let err = client.get("a").unwrap_err();
    assert!(matches!(err, Error::DuplicateAccess { ref key } if key == "a"));
    assert!(err.is_precondition());
}

#[test]
fn duplicate_in_multiget_list_fails_before_round_trip() {
    let (store, mut client) = scripted_client();
    client.begin().unwrap();
    store.clear_calls();

    let err = client.multiget(&["a", "b", "a"]).unwrap_err();
    assert!(matches!(err, Error::DuplicateAccess { .. }));
    assert!(store.calls().is_empty());
    assert!(client.transaction().rwset.is_empty());
}

#[test]
fn put_twice_is_duplicate_access() {
    let (_, mut client) = memory_client();
    client.begin().unwrap();
    client.put("a", "1").unwrap();
    assert!(matches!(
        client.remove("a").unwrap_err(),
        Error::DuplicateAccess { .. }
    ));
}

#[test]
fn read_after_write_is_duplicate_access() {
    let (_, mut client) = memory_client();
    client.begin().unwrap();
    client.put("a", "1").unwrap();
    assert!(client.get("a").is_err());
    assert!(client.get_deferred("a").is_err());
}

#[test]
fn deferred_read_after_concrete_read_is_duplicate_access() {
    let (_, mut client) = memory_client();
    client.begin().unwrap();
    client.get("a").unwrap();
    assert!(matches!(
        client.get_deferred("a").unwrap_err(),
        Error::DuplicateAccess { .. }
    ));
}

// ============================================================================
// Entry Shape
// ============================================================================

#[test]
fn read_then_write_is_one_read_write_entry() {
    let (store, mut client) = memory_client();
    seed(&*store, &[("c-1_1_1-balance", "-10.0")]);
    client.begin().unwrap();
    client.get("c-1_1_1-balance").unwrap();
    client.put("c-1_1_1-balance", "-22.5").unwrap();

    let rwset = &client.transaction().rwset;
    assert_eq!(rwset.len(), 1);
    let entry = rwset.get("c-1_1_1-balance").unwrap();
    assert_eq!(entry.kind, AccessKind::ReadWrite);
    assert!(matches!(entry.read, Some(ReadPayload::Concrete(ref r)) if r.existed));
    let write = entry.write.as_ref().unwrap();
    assert_eq!(write.op, WriteOp::Set);
    assert_eq!(write.value, WriteValue::Concrete(b"-22.5".to_vec()));
}

#[test]
fn deferred_read_then_deferred_write() {
    let (_, mut client) = memory_client();
    client.begin().unwrap();
    let ytd = client.get_deferred("w-1-ytd").unwrap();
    let next = client.add(ytd, 12.5).unwrap();
    client.put_deferred("w-1-ytd", next).unwrap();

    let entry = client.transaction().rwset.get("w-1-ytd").unwrap();
    assert_eq!(entry.kind, AccessKind::ReadWrite);
    assert_eq!(entry.read, Some(ReadPayload::Future(ytd)));
    assert_eq!(
        entry.write.as_ref().unwrap().value,
        WriteValue::Future(next)
    );
}

#[test]
fn delete_carries_empty_value() {
    let (_, mut client) = memory_client();
    client.begin().unwrap();
    client.remove("no-1_1_3001-").unwrap();
    let entry = client.transaction().rwset.get("no-1_1_3001-").unwrap();
    assert_eq!(entry.kind, AccessKind::Write);
    let write = entry.write.as_ref().unwrap();
    assert_eq!(write.op, WriteOp::Delete);
    assert_eq!(write.value, WriteValue::Concrete(Vec::new()));
}

#[test]
fn entries_keep_access_order() {
    let (_, mut client) = memory_client();
    client.begin().unwrap();
    client.put("z", "1").unwrap();
    client.get("a").unwrap();
    client.get_deferred("m").unwrap();
    client.put("a", "2").unwrap();

    let keys: Vec<_> = client
        .transaction()
        .rwset
        .entries()
        .iter()
        .map(|e| e.key.as_str())
        .collect();
    assert_eq!(keys, vec!["z", "a", "m"]);
}

#[test]
fn begin_starts_with_empty_set() {
    let (_, mut client) = memory_client();
    client.begin().unwrap();
    client.put("a", "1").unwrap();
    client.abort().unwrap();

    client.begin().unwrap();
    assert!(client.transaction().rwset.is_empty());
    client.put("a", "1").unwrap();
}

// ============================================================================
// Property: one entry per key
// ============================================================================

#[derive(Debug, Clone)]
enum Access {
    Get(u8),
    Put(u8),
}

fn access() -> impl Strategy<Value = Access> {
    prop_oneof![
        (0u8..6).prop_map(Access::Get),
        (0u8..6).prop_map(Access::Put),
    ]
}

proptest! {
    #[test]
    fn each_key_recorded_at_most_once(ops in prop::collection::vec(access(), 0..24)) {
        let (_, mut client) = memory_client();
        client.begin().unwrap();

        for op in &ops {
            // Rejected accesses must leave the set untouched
            let _ = match op {
                Access::Get(k) => client.get(&format!("k{}", k)).map(|_| ()),
                Access::Put(k) => client.put(&format!("k{}", k), "v"),
            };
        }

        let entries = client.transaction().rwset.entries();
        let mut keys: Vec<_> = entries.iter().map(|e| e.key.clone()).collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        prop_assert_eq!(keys.len(), total);

        for entry in entries {
            let read = ops.iter().position(|o| matches!(o, Access::Get(k) if format!("k{}", k) == entry.key));
            let write = ops.iter().position(|o| matches!(o, Access::Put(k) if format!("k{}", k) == entry.key));
            let expected = match (read, write) {
                (Some(r), Some(w)) if r < w => AccessKind::ReadWrite,
                (Some(r), Some(w)) if w < r => AccessKind::Write,
                (Some(_), None) => AccessKind::Read,
                (None, Some(_)) => AccessKind::Write,
                _ => unreachable!(),
            };
            prop_assert_eq!(entry.kind, expected);
        }
    }
}
