//! Read/write set of one transaction
//!
//! Entries keep insertion order (the store replays writes in that order) and
//! are indexed by key. A key is accessed at most once per transaction: the only
//! allowed second access is a write after a read, which upgrades the existing
//! entry to `ReadWrite` in place.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use deferkv_core::{Error, ReadResult, Result};

use crate::future::FutureHandle;

/// How a key was accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessKind {
    /// Read only
    Read,
    /// Written without a prior read
    Write,
    /// Read, then written
    ReadWrite,
}

/// What a read observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadPayload {
    /// Value fetched from the store
    Concrete(ReadResult),
    /// Deferred read; the value lives in the READ node
    Future(FutureHandle),
}

/// Kind of write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteOp {
    /// Store a value
    Set,
    /// Remove the key
    Delete,
}

/// Value carried by a write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteValue {
    /// Bytes known at write time
    Concrete(Vec<u8>),
    /// Result of a future expression
    Future(FutureHandle),
}

/// A buffered write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Write {
    /// Set or delete
    pub op: WriteOp,
    /// Value to store (empty for deletes)
    pub value: WriteValue,
}

impl Write {
    /// Set `key` to concrete bytes
    pub fn set(value: impl Into<Vec<u8>>) -> Self {
        Self {
            op: WriteOp::Set,
            value: WriteValue::Concrete(value.into()),
        }
    }

    /// Set `key` to the value of a future
    pub fn set_future(handle: FutureHandle) -> Self {
        Self {
            op: WriteOp::Set,
            value: WriteValue::Future(handle),
        }
    }

    /// Remove `key`
    pub fn delete() -> Self {
        Self {
            op: WriteOp::Delete,
            value: WriteValue::Concrete(Vec::new()),
        }
    }
}

/// One key's access record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RwSetEntry {
    /// Store key
    pub key: String,
    /// Access kind
    pub kind: AccessKind,
    /// Present for `Read` and `ReadWrite`
    pub read: Option<ReadPayload>,
    /// Present for `Write` and `ReadWrite`
    pub write: Option<Write>,
}

/// Ordered, key-indexed set of accesses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<RwSetEntry>", into = "Vec<RwSetEntry>")]
pub struct ReadWriteSet {
    entries: Vec<RwSetEntry>,
    index: HashMap<String, usize>,
}

impl ReadWriteSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail if `key` has been accessed in this transaction
    pub fn check_unaccessed(&self, key: &str) -> Result<()> {
        if self.index.contains_key(key) {
            return Err(Error::DuplicateAccess {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Record a read of `key`
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAccess` if the key was already read or written.
    pub fn record_read(&mut self, key: &str, payload: ReadPayload) -> Result<()> {
        self.check_unaccessed(key)?;
        self.push(RwSetEntry {
            key: key.to_string(),
            kind: AccessKind::Read,
            read: Some(payload),
            write: None,
        });
        Ok(())
    }

    /// Record a write of `key`
    ///
    /// A previously read key becomes `ReadWrite`; any other key gets a fresh
    /// `Write` entry.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAccess` if the key was already written.
    pub fn record_write(&mut self, key: &str, write: Write) -> Result<()> {
        match self.index.get(key) {
            Some(&pos) => {
                let entry = &mut self.entries[pos];
                if entry.kind != AccessKind::Read {
                    return Err(Error::DuplicateAccess {
                        key: key.to_string(),
                    });
                }
                entry.kind = AccessKind::ReadWrite;
                entry.write = Some(write);
            }
            None => self.push(RwSetEntry {
                key: key.to_string(),
                kind: AccessKind::Write,
                read: None,
                write: Some(write),
            }),
        }
        Ok(())
    }

    /// Entry for `key`
    pub fn get(&self, key: &str) -> Option<&RwSetEntry> {
        self.index.get(key).map(|&pos| &self.entries[pos])
    }

    /// Whether `key` has been accessed
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// READ node recorded for a deferred read of `key`
    pub fn read_future(&self, key: &str) -> Option<FutureHandle> {
        match self.get(key)?.read {
            Some(ReadPayload::Future(h)) => Some(h),
            _ => None,
        }
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[RwSetEntry] {
        &self.entries
    }

    /// Number of keys accessed
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key has been accessed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries carrying a write
    pub fn write_count(&self) -> usize {
        self.entries.iter().filter(|e| e.write.is_some()).count()
    }

    /// Remove every entry, keeping allocations
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    fn push(&mut self, entry: RwSetEntry) {
        self.index.insert(entry.key.clone(), self.entries.len());
        self.entries.push(entry);
    }
}

impl From<Vec<RwSetEntry>> for ReadWriteSet {
    fn from(entries: Vec<RwSetEntry>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(pos, e)| (e.key.clone(), pos))
            .collect();
        Self { entries, index }
    }
}

impl From<ReadWriteSet> for Vec<RwSetEntry> {
    fn from(set: ReadWriteSet) -> Self {
        set.entries
    }
}
