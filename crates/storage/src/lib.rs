//! In-process store for deferkv
//!
//! `MemoryStore` implements the primitive store operations with memcached
//! semantics (add fails on existing keys, incr/decr fail on missing keys).
//! It performs no transaction validation: whatever payload `add` receives is
//! stored verbatim under the transaction id. Used by tests and the CLI
//! workload harness.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;

pub use memory::{MemoryStore, ReadStats};
