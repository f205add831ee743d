//! Transaction client
//!
//! `TransactionClient` drives one transaction at a time against a [`Store`]
//! that only offers primitive atomic operations. Conflicts are never detected
//! here: the store validates the submitted read/write set, and its reply to a
//! single create-if-absent is the commit decision.
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. begin()     - allocate or reuse the id, reset the transaction,
//!                  announce it (incr <id>) unless resuming a rejected attempt
//! 2. get/put/... - record accesses in the read/write set, build futures
//! 3. commit()    - serialize, then add(<id>, payload)
//!                  true  => Committed, sequence advances
//!                  false => AbortedRetryable, sequence kept for the retry
//! 4. abort()     - retract the announce (decr <id>), sequence advances
//! ```
//!
//! Transport failures are surfaced as `Error::Store` and never retried.

use std::collections::{HashMap, HashSet};

use deferkv_core::{
    ClientConfig, ClientId, Error, ExprError, ReadContext, ReadResult, Result, Store,
    TransactionId,
};

use crate::future::{render_float, FutureHandle, FutureNode, Opcode, Operand, Resolution, TRUE};
use crate::payload::TransactionPayload;
use crate::rwset::{ReadPayload, Write};
use crate::transaction::{FutureWrite, Predicate, Transaction, TransactionStatus};

/// Reason attached to a commit the store refused
pub const COMMIT_REJECTED: &str = "commit rejected by store";

/// Numeric literal for arithmetic builders
///
/// The variant selects the opcode: `Int` builds `ADD_INT`/`SUB_INT`, `Float`
/// builds `ADD_FLOAT`/`SUB_FLOAT`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Integer literal
    Int(i64),
    /// Floating point literal
    Float(f64),
}

impl Number {
    fn literal(self) -> Operand {
        match self {
            Number::Int(v) => Operand::literal(v),
            Number::Float(v) => Operand::Literal(render_float(v)),
        }
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::Int(v)
    }
}

impl From<i32> for Number {
    fn from(v: i32) -> Self {
        Number::Int(v.into())
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::Float(v)
    }
}

/// Client side of the OCC protocol
///
/// One instance runs one transaction at a time. Concurrency comes from running
/// many independent instances, each with its own id sequence.
pub struct TransactionClient<S: Store> {
    store: S,
    config: ClientConfig,
    client_id: ClientId,
    /// Sequence of the current (or next) attempt
    sequence: u64,
    /// Set by a commit rejection; the next begin reuses the id
    retrying: bool,
    /// Whether the in-flight id was announced to the store
    announced: bool,
    status: TransactionStatus,
    txn: Transaction,
    /// Last committed transaction
    previous: Option<Transaction>,
}

impl<S: Store> TransactionClient<S> {
    /// Create a client with default configuration
    pub fn new(store: S) -> Self {
        Self::with_config(store, ClientConfig::default())
    }

    /// Create a client with the given configuration
    pub fn with_config(store: S, config: ClientConfig) -> Self {
        let client_id = ClientId::new();
        Self {
            store,
            config,
            client_id,
            sequence: 1,
            retrying: false,
            announced: false,
            status: TransactionStatus::Idle,
            txn: Transaction::new(TransactionId::new(client_id, 1)),
            previous: None,
        }
    }

    /// Identity of this client
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Id of the current (or next) attempt
    pub fn id(&self) -> TransactionId {
        TransactionId::new(self.client_id, self.sequence)
    }

    /// Lifecycle status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Transaction being built
    pub fn transaction(&self) -> &Transaction {
        &self.txn
    }

    /// Last committed transaction, if any
    pub fn previous(&self) -> Option<&Transaction> {
        self.previous.as_ref()
    }

    /// Whether the next `begin()` resumes a rejected attempt
    pub fn is_retrying(&self) -> bool {
        self.retrying
    }

    /// Configuration in use
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Start a transaction
    ///
    /// After a commit rejection the same id is reused and the announce is
    /// skipped; otherwise the current sequence number is used and the
    /// transaction is announced when `announce` is configured.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if a transaction is active or committing
    /// - `Store` if the announce fails
    pub fn begin(&mut self) -> Result<()> {
        if !self.status.can_begin() {
            return Err(Error::invalid_state("begin", &self.status));
        }

        let id = self.id();
        let resuming = self.retrying;
        if self.config.announce && !resuming {
            let reply = self.store.incr(&id.to_key(), 1)?;
            if reply.is_none() {
                tracing::debug!(txn_id = %id, "Announce not counted by store");
            }
            self.announced = true;
        }

        self.retrying = false;
        self.txn.reset(id);
        self.status = TransactionStatus::Active;
        tracing::debug!(txn_id = %id, resuming, "Transaction started");
        Ok(())
    }

    /// Read `key` inside the transaction
    ///
    /// # Errors
    ///
    /// - `InvalidState` if no transaction is active
    /// - `DuplicateAccess` if `key` was already accessed
    /// - `Store` on transport failure
    pub fn get(&mut self, key: &str) -> Result<ReadResult> {
        let mut results = self.multiget(&[key])?;
        Ok(results.remove(key).unwrap_or_else(ReadResult::absent))
    }

    /// Read several keys inside the transaction in one round trip
    ///
    /// Every key must be new to the transaction and appear once in `keys`.
    pub fn multiget<K: AsRef<str>>(&mut self, keys: &[K]) -> Result<HashMap<String, ReadResult>> {
        self.status.ensure_active("get")?;
        self.check_fresh(keys)?;

        let scoped = ReadContext::transactional(&self.txn.id).scoped_keys(keys);
        let mut replies = self.store.multi_get(&scoped)?;

        let mut results = HashMap::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            let result = match replies.remove(key) {
                Some((value, version)) => ReadResult::found(value, version),
                None => ReadResult::absent(),
            };
            self.txn
                .rwset
                .record_read(key, ReadPayload::Concrete(result.clone()))?;
            results.insert(key.to_string(), result);
        }
        tracing::debug!(txn_id = %self.txn.id, keys = keys.len(), "Transactional read");
        Ok(results)
    }

    /// Read reference data outside conflict tracking
    ///
    /// Does not touch the read/write set and works in any state.
    ///
    /// # Errors
    ///
    /// `MissingKey` if the key does not exist.
    pub fn get_notxn(&self, key: &str) -> Result<Vec<u8>> {
        let mut values = self.multiget_notxn(&[key])?;
        values.remove(key).ok_or_else(|| Error::MissingKey {
            key: key.to_string(),
        })
    }

    /// Read several reference-data keys; every key must exist
    pub fn multiget_notxn<K: AsRef<str>>(&self, keys: &[K]) -> Result<HashMap<String, Vec<u8>>> {
        let scoped = ReadContext::untracked(&self.txn.id).scoped_keys(keys);
        let mut replies = self.store.multi_get(&scoped)?;

        let mut values = HashMap::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            let (value, _) = replies.remove(key).ok_or_else(|| Error::MissingKey {
                key: key.to_string(),
            })?;
            values.insert(key.to_string(), value);
        }
        Ok(values)
    }

    /// Buffer a write of `value` to `key`
    ///
    /// # Errors
    ///
    /// - `InvalidState` if no transaction is active
    /// - `DuplicateAccess` if `key` was already written
    pub fn put(&mut self, key: &str, value: impl AsRef<[u8]>) -> Result<()> {
        self.write(key, Write::set(value.as_ref()))
    }

    /// Buffer a delete of `key`
    pub fn remove(&mut self, key: &str) -> Result<()> {
        self.write(key, Write::delete())
    }

    fn write(&mut self, key: &str, write: Write) -> Result<()> {
        self.status.ensure_active("put")?;
        self.txn.rwset.record_write(key, write)?;
        tracing::debug!(txn_id = %self.txn.id, key, "Write buffered");
        Ok(())
    }

    /// Record a deferred read of `key` without a round trip
    ///
    /// Returns a handle to the READ node; the value is bound when the store
    /// (or [`is_true`](Self::is_true)) resolves it.
    pub fn get_deferred(&mut self, key: &str) -> Result<FutureHandle> {
        self.status.ensure_active("get")?;
        self.txn.rwset.check_unaccessed(key)?;
        let handle = self.txn.fset.push_read(key);
        self.txn
            .rwset
            .record_read(key, ReadPayload::Future(handle))?;
        Ok(handle)
    }

    /// Buffer a write of the value of `value` to `key`
    pub fn put_deferred(&mut self, key: &str, value: FutureHandle) -> Result<()> {
        self.check_handle(value)?;
        self.write(key, Write::set_future(value))
    }

    /// `value + n`
    pub fn add(&mut self, value: FutureHandle, n: impl Into<Number>) -> Result<FutureHandle> {
        let n = n.into();
        let op = match n {
            Number::Int(_) => Opcode::AddInt,
            Number::Float(_) => Opcode::AddFloat,
        };
        self.binary(op, value.into(), n.literal())
    }

    /// `value - n`
    pub fn sub(&mut self, value: FutureHandle, n: impl Into<Number>) -> Result<FutureHandle> {
        let n = n.into();
        let op = match n {
            Number::Int(_) => Opcode::SubInt,
            Number::Float(_) => Opcode::SubFloat,
        };
        self.binary(op, value.into(), n.literal())
    }

    /// `value * n`
    pub fn mul(&mut self, value: FutureHandle, n: f64) -> Result<FutureHandle> {
        self.binary(Opcode::MulFloat, value.into(), Number::Float(n).literal())
    }

    /// `value >= n`
    pub fn gte(&mut self, value: FutureHandle, n: i64) -> Result<FutureHandle> {
        self.binary(Opcode::GteInt, value.into(), Operand::literal(n))
    }

    /// `value` followed by `suffix`
    pub fn concat(&mut self, value: FutureHandle, suffix: &str) -> Result<FutureHandle> {
        self.binary(Opcode::ConcatLeft, value.into(), Operand::literal(suffix))
    }

    /// `prefix` followed by `value`
    pub fn concat_onto(&mut self, prefix: &str, value: FutureHandle) -> Result<FutureHandle> {
        self.binary(Opcode::ConcatRight, Operand::literal(prefix), value.into())
    }

    /// First `n` characters of `value`
    pub fn truncate(&mut self, value: FutureHandle, n: usize) -> Result<FutureHandle> {
        self.binary(Opcode::Truncate, value.into(), Operand::literal(n))
    }

    /// Whether `needle` occurs within `value`
    pub fn substring_of(&mut self, value: FutureHandle, needle: &str) -> Result<FutureHandle> {
        self.binary(Opcode::SubstringOf, value.into(), Operand::literal(needle))
    }

    /// Whether the key behind the READ `value` exists
    pub fn exists(&mut self, value: FutureHandle) -> Result<FutureHandle> {
        self.status.ensure_active("build future")?;
        self.txn.fset.push_unary(Opcode::Exists, value)
    }

    fn binary(&mut self, op: Opcode, left: Operand, right: Operand) -> Result<FutureHandle> {
        self.status.ensure_active("build future")?;
        self.txn.fset.push_binary(op, left, right)
    }

    /// Evaluate a boolean expression now and record it as a predicate
    ///
    /// The expression must depend on exactly one key, read with
    /// [`get_deferred`](Self::get_deferred). If that read is still unbound it
    /// is fetched once through the transactional read path. The store
    /// re-checks the predicate against its own state at commit.
    ///
    /// # Errors
    ///
    /// - `Expression(PredicateKeys)` if the expression depends on zero or
    ///   several keys
    /// - `UnboundRead` if the key was not read with `get_deferred`
    pub fn is_true(&mut self, expr: FutureHandle) -> Result<bool> {
        self.status.ensure_active("evaluate predicate")?;
        let keys = self.txn.fset.keys_of(expr)?;
        let key = match keys.as_slice() {
            [key] => key.clone(),
            _ => return Err(ExprError::PredicateKeys { count: keys.len() }.into()),
        };
        let read = self
            .txn
            .rwset
            .read_future(&key)
            .ok_or_else(|| Error::UnboundRead { key: key.clone() })?;

        let data = self.bound_read(read, &key)?;
        let env = HashMap::from([(key, data)]);
        let value = self.txn.fset.resolve(expr, &env, Resolution::Transient)?;
        let expected = value.as_deref() == Some(TRUE.as_bytes());

        self.txn.predicates.push(Predicate {
            keys,
            index: expr,
            expected,
        });
        Ok(expected)
    }

    fn bound_read(&mut self, read: FutureHandle, key: &str) -> Result<ReadResult> {
        if let Some(FutureNode::Read {
            data: Some(data), ..
        }) = self.txn.fset.get(read)
        {
            return Ok(data.clone());
        }

        let scoped = ReadContext::transactional(&self.txn.id).scoped_keys(&[key]);
        let data = match self.store.multi_get(&scoped)?.remove(key) {
            Some((value, version)) => ReadResult::found(value, version),
            None => ReadResult::absent(),
        };
        self.txn.fset.bind_read(read, data.clone())?;
        Ok(data)
    }

    /// Buffer a write of `value` at the key computed by `key`
    pub fn put_at(&mut self, key: FutureHandle, value: impl AsRef<[u8]>) -> Result<()> {
        self.write_at(key, Write::set(value.as_ref()))
    }

    /// Buffer a write of the future `value` at the key computed by `key`
    pub fn put_at_deferred(&mut self, key: FutureHandle, value: FutureHandle) -> Result<()> {
        self.check_handle(value)?;
        self.write_at(key, Write::set_future(value))
    }

    /// Buffer a delete of the key computed by `key`
    pub fn remove_at(&mut self, key: FutureHandle) -> Result<()> {
        self.write_at(key, Write::delete())
    }

    fn write_at(&mut self, key: FutureHandle, write: Write) -> Result<()> {
        self.status.ensure_active("put")?;
        let keys = self.txn.fset.keys_of(key)?;
        self.txn.future_writes.push(FutureWrite {
            keys,
            index: key,
            write,
        });
        Ok(())
    }

    /// Submit the transaction
    ///
    /// # Errors
    ///
    /// - `TransactionAborted` if the store refused the commit; call `begin()`
    ///   and re-run the transaction body
    /// - `InvalidState` if no transaction is active
    /// - `Serialization` if the payload cannot be encoded
    /// - `Store` on transport failure (the attempt is finished)
    pub fn commit(&mut self) -> Result<()> {
        self.status.ensure_active("commit")?;
        let bytes = TransactionPayload::from_transaction(&self.txn).to_bytes()?;
        let id = self.txn.id;
        self.status = TransactionStatus::Committing;

        match self.store.add(&id.to_key(), &bytes) {
            Ok(true) => {
                tracing::info!(
                    txn_id = %id,
                    entries = self.txn.rwset.len(),
                    futures = self.txn.fset.len(),
                    bytes = bytes.len(),
                    "Transaction committed"
                );
                self.status = TransactionStatus::Committed;
                let next = match self.previous.take() {
                    Some(mut spare) => {
                        spare.reset(id);
                        spare
                    }
                    None => Transaction::new(id),
                };
                self.previous = Some(std::mem::replace(&mut self.txn, next));
                self.done();
                Ok(())
            }
            Ok(false) => {
                tracing::warn!(txn_id = %id, "Commit rejected by store");
                self.status = TransactionStatus::AbortedRetryable {
                    reason: COMMIT_REJECTED.to_string(),
                };
                self.retrying = true;
                Err(Error::TransactionAborted {
                    reason: COMMIT_REJECTED.to_string(),
                })
            }
            Err(e) => {
                tracing::error!(
                    txn_id = %id,
                    error = %e,
                    "Store failure during commit"
                );
                self.status = TransactionStatus::Idle;
                self.done();
                Err(e.into())
            }
        }
    }

    /// Abandon the transaction
    ///
    /// Retracts the announce and finishes the attempt; the next `begin()`
    /// starts a new id. Not a retry.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if there is nothing to abort
    /// - `Store` if the retraction fails (the attempt is still finished)
    pub fn abort(&mut self) -> Result<()> {
        if !self.status.can_abort() {
            return Err(Error::invalid_state("abort", &self.status));
        }
        let id = self.txn.id;
        let retraction = if self.announced {
            Some(self.store.decr(&id.to_key(), 1))
        } else {
            None
        };

        tracing::debug!(txn_id = %id, "Transaction aborted");
        self.status = TransactionStatus::Idle;
        self.txn.reset(id);
        self.done();

        if let Some(reply) = retraction {
            reply?;
        }
        Ok(())
    }

    /// Resolve `handle` from the last committed transaction
    ///
    /// Resolution is durable: the first call caches every computed node, and
    /// later calls return the same value without consulting `env`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if nothing has been committed yet.
    pub fn committed_value(
        &mut self,
        handle: FutureHandle,
        env: &HashMap<String, ReadResult>,
    ) -> Result<Option<Vec<u8>>> {
        let status = &self.status;
        let previous = self
            .previous
            .as_mut()
            .ok_or_else(|| Error::invalid_state("read committed value", status))?;
        previous.fset.resolve(handle, env, Resolution::Durable)
    }

    fn done(&mut self) {
        self.sequence += 1;
        self.retrying = false;
        self.announced = false;
    }

    fn check_handle(&self, handle: FutureHandle) -> Result<()> {
        if self.txn.fset.get(handle).is_none() {
            return Err(Error::InvalidHandle {
                index: handle.index(),
                len: self.txn.fset.len(),
            });
        }
        Ok(())
    }

    fn check_fresh<K: AsRef<str>>(&self, keys: &[K]) -> Result<()> {
        let mut seen = HashSet::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            self.txn.rwset.check_unaccessed(key)?;
            if !seen.insert(key) {
                return Err(Error::DuplicateAccess {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }
}
