//! Core types and traits for deferkv
//!
//! This crate defines the foundational types shared by the transaction client:
//! - ClientId / TransactionId: identity of a client and of each attempt
//! - ReadResult: concrete outcome of a store read
//! - Error / StoreError: error taxonomy (retryable, precondition, fatal)
//! - keys: deterministic record-to-key encoding
//! - Store: the primitive operations the remote key-value service exposes
//! - ClientConfig: `deferkv.toml` configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod keys;
pub mod traits;
pub mod types;

pub use config::{ClientConfig, CONFIG_FILE_NAME};
pub use error::{Error, ExprError, Result, StoreError, StoreResult};
pub use keys::Table;
pub use traits::{ReadContext, Store, NOTX_MARKER, TX_MARKER};
pub use types::{ClientId, ReadResult, TransactionId};
