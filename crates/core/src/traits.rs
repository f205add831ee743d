//! Core trait for the remote key-value store
//!
//! The transaction client only ever talks to the store through the primitive
//! operations declared here. Network transports implement `Store`; tests and
//! the CLI use the in-process `MemoryStore` from `deferkv-storage`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::StoreResult;
use crate::types::TransactionId;

/// Context marker for reads that take part in conflict tracking
pub const TX_MARKER: &str = "tx";

/// Context marker for reference-data reads outside conflict tracking
pub const NOTX_MARKER: &str = "notx";

/// Primitive operations of the key-value service
///
/// All calls block until the store replies. Thread safety: implementations
/// must be safe to share between independent clients (Send + Sync).
pub trait Store: Send + Sync {
    /// Get the current value of a key
    ///
    /// Returns None if the key doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Get several keys in one round trip
    ///
    /// The first two elements of `keys` may carry a read context (see
    /// [`ReadContext`]); they are never returned as results. Missing keys are
    /// simply absent from the returned map. Values come with their version.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    fn multi_get(&self, keys: &[String]) -> StoreResult<HashMap<String, (Vec<u8>, u64)>>;

    /// Store `value` under `key` only if the key does not exist yet
    ///
    /// Returns whether the value was stored. This is the sole commit oracle.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    fn add(&self, key: &str, value: &[u8]) -> StoreResult<bool>;

    /// Atomically increment a numeric value
    ///
    /// Returns the new value, or None when the store refuses (for example
    /// the key does not exist).
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    fn incr(&self, key: &str, delta: u64) -> StoreResult<Option<u64>>;

    /// Atomically decrement a numeric value, saturating at zero
    ///
    /// Returns the new value, or None when the store refuses.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    fn decr(&self, key: &str, delta: u64) -> StoreResult<Option<u64>>;

    /// Unconditionally write a value
    ///
    /// Only used for bulk loading, outside any transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn multi_get(&self, keys: &[String]) -> StoreResult<HashMap<String, (Vec<u8>, u64)>> {
        (**self).multi_get(keys)
    }

    fn add(&self, key: &str, value: &[u8]) -> StoreResult<bool> {
        (**self).add(key, value)
    }

    fn incr(&self, key: &str, delta: u64) -> StoreResult<Option<u64>> {
        (**self).incr(key, delta)
    }

    fn decr(&self, key: &str, delta: u64) -> StoreResult<Option<u64>> {
        (**self).decr(key, delta)
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        (**self).set(key, value)
    }
}

/// Read context carried in the first two slots of a `multi_get` key list
///
/// ```text
/// [ <transaction id>, "tx",   key1, key2, ... ]   conflict-tracked read
/// [ <transaction id>, "notx", key1, key2, ... ]   reference-data read
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadContext {
    /// Read on behalf of the given transaction
    Transactional(String),
    /// Read of reference data; the string is an opaque marker
    Untracked(String),
}

impl ReadContext {
    /// Context for an in-transaction read
    pub fn transactional(id: &TransactionId) -> Self {
        ReadContext::Transactional(id.to_key())
    }

    /// Context for a reference-data read
    pub fn untracked(id: &TransactionId) -> Self {
        ReadContext::Untracked(id.to_key())
    }

    /// Build the full key list for `Store::multi_get`
    pub fn scoped_keys<K: AsRef<str>>(&self, keys: &[K]) -> Vec<String> {
        let (marker, kind) = match self {
            ReadContext::Transactional(m) => (m, TX_MARKER),
            ReadContext::Untracked(m) => (m, NOTX_MARKER),
        };
        let mut scoped = Vec::with_capacity(keys.len() + 2);
        scoped.push(marker.clone());
        scoped.push(kind.to_string());
        scoped.extend(keys.iter().map(|k| k.as_ref().to_string()));
        scoped
    }

    /// Split a raw `multi_get` key list into its context and the real keys
    ///
    /// Lists without a recognised marker in the second slot have no context.
    pub fn split(keys: &[String]) -> (Option<ReadContext>, &[String]) {
        if keys.len() >= 2 {
            match keys[1].as_str() {
                TX_MARKER => {
                    return (Some(ReadContext::Transactional(keys[0].clone())), &keys[2..])
                }
                NOTX_MARKER => return (Some(ReadContext::Untracked(keys[0].clone())), &keys[2..]),
                _ => {}
            }
        }
        (None, keys)
    }
}
