//! End-to-End Tests
//!
//! Whole transactions against a shared store, including several independent
//! clients committing at once.

use deferkv::keys::{self, field};
use deferkv::{run_with_retry, Store, TransactionClient, TransactionPayload, WriteValue};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use crate::common::*;

#[test]
fn commit_then_next_begin_uses_sequence_two() {
    let (_, mut client) = memory_client();
    client.begin().unwrap();
    client.put("w-1-ytd", "100.0").unwrap();
    client.commit().unwrap();

    client.begin().unwrap();
    assert_eq!(client.transaction().id.sequence, 2);
}

#[test]
fn clients_on_same_key_have_distinct_ids() {
    let store = Arc::new(MemoryStore::new());
    let mut a = TransactionClient::new(Arc::clone(&store));
    let mut b = TransactionClient::new(Arc::clone(&store));

    a.begin().unwrap();
    b.begin().unwrap();
    a.put("w-1-ytd", "1.0").unwrap();
    b.put("w-1-ytd", "2.0").unwrap();

    let (ida, idb) = (a.transaction().id, b.transaction().id);
    assert_eq!(ida.sequence, idb.sequence);
    assert_ne!(ida, idb);
    assert_ne!(ida.to_key(), idb.to_key());

    // Same sequence number, different create-if-absent keys: both land
    a.commit().unwrap();
    b.commit().unwrap();
    assert!(store.contains(&ida.to_key()));
    assert!(store.contains(&idb.to_key()));
}

#[test]
fn payment_shaped_transaction_payload() {
    let (store, mut client) = memory_client();
    seed(
        &*store,
        &[
            (keys::warehouse(1, field::RECORD).as_str(), "W1"),
            (keys::customer(5, 3, 1, field::BALANCE).as_str(), "-10.0"),
        ],
    );
    let id = client.id();

    client.begin().unwrap();
    let name = client.get_notxn(&keys::warehouse(1, field::RECORD)).unwrap();
    assert_eq!(name, b"W1".to_vec());

    let ytd_key = keys::warehouse(1, field::YTD);
    let ytd = client.get_deferred(&ytd_key).unwrap();
    let next = client.add(ytd, 12.5).unwrap();
    client.put_deferred(&ytd_key, next).unwrap();

    let balance_key = keys::customer(5, 3, 1, field::BALANCE);
    client.get(&balance_key).unwrap();
    client.put(&balance_key, "-22.5").unwrap();
    client.commit().unwrap();

    let raw = store.get(&id.to_key()).unwrap().unwrap();
    let payload = TransactionPayload::from_bytes(&raw).unwrap();
    let keys: Vec<_> = payload.read_write_set.iter().map(|e| e.key.clone()).collect();
    assert_eq!(keys, vec![ytd_key, balance_key]);
    assert_eq!(payload.future_set.len(), 2);
    assert_eq!(
        payload.read_write_set[0].write.as_ref().unwrap().value,
        WriteValue::Future(next)
    );
}

#[test]
fn concurrent_clients_commit_under_unique_ids() {
    const CLIENTS: usize = 8;
    const TXNS: usize = 25;

    let store = Arc::new(MemoryStore::new());
    let barrier = Arc::new(Barrier::new(CLIENTS));

    let handles: Vec<_> = (0..CLIENTS)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut client = TransactionClient::new(store);
                let mut ids = Vec::with_capacity(TXNS);
                barrier.wait();
                for t in 0..TXNS {
                    let id = client.id();
                    run_with_retry(&mut client, 0, |c| {
                        let ytd = c.get_deferred("w-1-ytd")?;
                        let next = c.add(ytd, 1)?;
                        c.put_deferred("w-1-ytd", next)?;
                        c.put(&format!("h-{}_{}-", i, t), "x")
                    })
                    .unwrap();
                    ids.push(id.to_key());
                }
                ids
            })
        })
        .collect();

    let mut all = HashSet::new();
    for h in handles {
        for id in h.join().unwrap() {
            assert!(all.insert(id));
        }
    }
    assert_eq!(all.len(), CLIENTS * TXNS);
    for id in &all {
        assert!(store.contains(id));
    }
}

#[test]
fn store_rejection_of_existing_id() {
    let (store, mut client) = memory_client();
    // Another party already holds the id about to be used
    store.set(&client.id().to_key(), b"taken").unwrap();

    client.begin().unwrap();
    client.put("a", "1").unwrap();
    let err = client.commit().unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(client.id().sequence, 1);
}
