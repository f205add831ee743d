//! Commit payload serialization
//!
//! A transaction is submitted to the store as a single opaque blob: the value
//! of the create-if-absent issued under the transaction id. The store parses
//! it to validate the read set and replay the write set in entry order.
//!
//! ## Format
//!
//! The payload is serialized using MessagePack (`rmp-serde`) for compact
//! binary encoding with schema evolution support.

use serde::{Deserialize, Serialize};

use deferkv_core::{Error, Result};

use crate::future::FutureNode;
use crate::rwset::RwSetEntry;
use crate::transaction::{FutureWrite, Predicate, Transaction};

/// Serializable form of a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPayload {
    /// Rendered transaction id (`<seq>-<client>`)
    pub transaction_id: String,
    /// Read/write set in insertion order
    pub read_write_set: Vec<RwSetEntry>,
    /// Future graph nodes in index order
    pub future_set: Vec<FutureNode>,
    /// Predicates over futures
    #[serde(default)]
    pub predicates: Vec<Predicate>,
    /// Writes at future-computed keys
    #[serde(default)]
    pub future_writes: Vec<FutureWrite>,
}

impl TransactionPayload {
    /// Build a payload from a transaction
    pub fn from_transaction(txn: &Transaction) -> Self {
        Self {
            transaction_id: txn.id.to_key(),
            read_write_set: txn.rwset.entries().to_vec(),
            future_set: txn.fset.nodes().to_vec(),
            predicates: txn.predicates.clone(),
            future_writes: txn.future_writes.clone(),
        }
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}
