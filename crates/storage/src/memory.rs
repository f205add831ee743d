//! DashMap-backed store
//!
//! - get()/multi_get(): lock-free reads via DashMap
//! - add(): atomic create-if-absent through the entry API
//! - incr()/decr(): atomic read-modify-write under the shard lock
//! - Version management with AtomicU64 (every write gets a fresh version)

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use deferkv_core::{ReadContext, Store, StoreResult};

#[derive(Debug, Clone)]
struct StoredValue {
    value: Vec<u8>,
    version: u64,
}

/// Counters of `multi_get` calls by read context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Calls carrying a `tx` context
    pub tracked: u64,
    /// Calls carrying a `notx` context
    pub untracked: u64,
    /// Calls without a context marker
    pub bare: u64,
}

/// In-memory key-value store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
    version: AtomicU64,
    tracked_reads: AtomicU64,
    untracked_reads: AtomicU64,
    bare_reads: AtomicU64,
    last_context: Mutex<Option<ReadContext>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `key` is present
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Current global version
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Read counters by context
    pub fn read_stats(&self) -> ReadStats {
        ReadStats {
            tracked: self.tracked_reads.load(Ordering::Relaxed),
            untracked: self.untracked_reads.load(Ordering::Relaxed),
            bare: self.bare_reads.load(Ordering::Relaxed),
        }
    }

    /// Context of the most recent `multi_get`
    pub fn last_read_context(&self) -> Option<ReadContext> {
        self.last_context.lock().clone()
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record_context(&self, context: Option<ReadContext>) {
        let counter = match &context {
            Some(ReadContext::Transactional(_)) => &self.tracked_reads,
            Some(ReadContext::Untracked(_)) => &self.untracked_reads,
            None => &self.bare_reads,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        *self.last_context.lock() = context;
    }

    fn apply_delta(&self, key: &str, delta: u64, up: bool) -> Option<u64> {
        let mut entry = self.entries.get_mut(key)?;
        let current: u64 = std::str::from_utf8(&entry.value).ok()?.trim().parse().ok()?;
        let next = if up {
            current.wrapping_add(delta)
        } else {
            current.saturating_sub(delta)
        };
        entry.value = next.to_string().into_bytes();
        entry.version = self.next_version();
        Some(next)
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|e| e.value.clone()))
    }

    fn multi_get(&self, keys: &[String]) -> StoreResult<HashMap<String, (Vec<u8>, u64)>> {
        let (context, keys) = ReadContext::split(keys);
        self.record_context(context);

        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(e) = self.entries.get(key) {
                found.insert(key.clone(), (e.value.clone(), e.version));
            }
        }
        Ok(found)
    }

    fn add(&self, key: &str, value: &[u8]) -> StoreResult<bool> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => {
                tracing::debug!(key, "add refused: key exists");
                Ok(false)
            }
            Entry::Vacant(slot) => {
                let version = self.next_version();
                slot.insert(StoredValue {
                    value: value.to_vec(),
                    version,
                });
                Ok(true)
            }
        }
    }

    fn incr(&self, key: &str, delta: u64) -> StoreResult<Option<u64>> {
        Ok(self.apply_delta(key, delta, true))
    }

    fn decr(&self, key: &str, delta: u64) -> StoreResult<Option<u64>> {
        Ok(self.apply_delta(key, delta, false))
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let version = self.next_version();
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_vec(),
                version,
            },
        );
        Ok(())
    }
}
