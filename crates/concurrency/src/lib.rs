//! Client-side optimistic concurrency control for deferkv
//!
//! This crate implements the transaction protocol on top of the primitive
//! store operations:
//! - FutureGraph: deferred expressions over not-yet-read values
//! - ReadWriteSet: per-transaction access tracking (one access per key)
//! - Transaction / TransactionPayload: the unit submitted at commit
//! - TransactionClient: begin/get/put/commit/abort state machine
//! - run_with_retry: caller-side loop over commit rejections

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod future;
pub mod payload;
pub mod retry;
pub mod rwset;
pub mod transaction;

pub use client::{Number, TransactionClient, COMMIT_REJECTED};
pub use future::{FutureGraph, FutureHandle, FutureNode, Opcode, Operand, Resolution};
pub use payload::TransactionPayload;
pub use retry::run_with_retry;
pub use rwset::{AccessKind, ReadPayload, ReadWriteSet, RwSetEntry, Write, WriteOp, WriteValue};
pub use transaction::{FutureWrite, Predicate, Transaction, TransactionStatus};
