//! Transaction state for the OCC client
//!
//! A `Transaction` is the unit shipped to the store at commit: its id, the
//! read/write set, the future graph, and the two future-driven sets (predicates
//! and future-keyed writes). The lifecycle status lives beside it in the
//! client, since one client reuses a single `Transaction` value across attempts.

use serde::{Deserialize, Serialize};

use deferkv_core::{Error, Result, TransactionId};

use crate::future::{FutureGraph, FutureHandle};
use crate::rwset::{ReadWriteSet, Write};

/// Status of the client's current transaction
///
/// State transitions:
/// - `Idle` → `Active` (begin)
/// - `Active` → `Committing` (commit submitted)
/// - `Committing` → `Committed` (store accepted)
/// - `Committing` → `AbortedRetryable` (store rejected)
/// - `Active` / `AbortedRetryable` → `Idle` (explicit abort)
/// - `Committed` / `AbortedRetryable` → `Active` (next begin)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// No transaction in flight
    Idle,
    /// Transaction is executing, can read/write
    Active,
    /// Commit payload submitted, waiting for the store
    Committing,
    /// Store accepted the last commit
    Committed,
    /// Store rejected the last commit; the next begin retries it
    AbortedRetryable {
        /// Reason for the rejection
        reason: String,
    },
}

impl TransactionStatus {
    /// Whether reads and writes are allowed
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionStatus::Active)
    }

    /// Whether `begin()` may start a transaction from this state
    pub fn can_begin(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Idle
                | TransactionStatus::Committed
                | TransactionStatus::AbortedRetryable { .. }
        )
    }

    /// Whether `abort()` has something to abort
    pub fn can_abort(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Active
                | TransactionStatus::Committing
                | TransactionStatus::AbortedRetryable { .. }
        )
    }

    /// Fail with `InvalidState` unless the status is `Active`
    pub fn ensure_active(&self, operation: &'static str) -> Result<()> {
        if !self.is_active() {
            return Err(Error::invalid_state(operation, self));
        }
        Ok(())
    }
}

/// Assumption about a future value, re-checked by the store at commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    /// Keys the expression depends on
    pub keys: Vec<String>,
    /// Expression node
    pub index: FutureHandle,
    /// Truth value observed by the client
    pub expected: bool,
}

/// Write whose key is the value of a future expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FutureWrite {
    /// Keys the key expression depends on
    pub keys: Vec<String>,
    /// Key expression node
    pub index: FutureHandle,
    /// The write to apply at the computed key
    pub write: Write,
}

/// One transaction attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// Id under which the transaction commits
    pub id: TransactionId,
    /// Keys read and written
    pub rwset: ReadWriteSet,
    /// Deferred computations
    pub fset: FutureGraph,
    /// Predicates over futures
    pub predicates: Vec<Predicate>,
    /// Writes at future-computed keys
    pub future_writes: Vec<FutureWrite>,
}

impl Transaction {
    /// Create an empty transaction
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            rwset: ReadWriteSet::new(),
            fset: FutureGraph::new(),
            predicates: Vec::new(),
            future_writes: Vec::new(),
        }
    }

    /// Reset for a new attempt, keeping allocated capacity
    pub fn reset(&mut self, id: TransactionId) {
        self.id = id;
        self.rwset.clear();
        self.fset.clear();
        self.predicates.clear();
        self.future_writes.clear();
    }

    /// Whether the transaction has no writes of any kind
    pub fn is_read_only(&self) -> bool {
        self.rwset.write_count() == 0 && self.future_writes.is_empty()
    }
}
