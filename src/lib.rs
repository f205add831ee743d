//! deferkv - Client-side OCC transactions over a primitive key-value store
//!
//! A [`TransactionClient`] buffers reads and writes locally and submits the
//! whole transaction as one create-if-absent under its id. Reads whose values
//! only matter to the store can be deferred into a [`FutureGraph`] that the
//! store evaluates at commit.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use deferkv::{MemoryStore, TransactionClient};
//!
//! let store = Arc::new(MemoryStore::new());
//! let mut client = TransactionClient::new(Arc::clone(&store));
//!
//! client.begin()?;
//! let ytd = client.get_deferred("w-1-ytd")?;
//! let next = client.add(ytd, 12.5)?;
//! client.put_deferred("w-1-ytd", next)?;
//! client.commit()?;
//! # Ok::<(), deferkv::Error>(())
//! ```
//!
//! # Architecture
//!
//! - `deferkv-core`: ids, errors, the `Store` trait, key encoding, config
//! - `deferkv-storage`: in-process `Store` with memcached semantics
//! - `deferkv-concurrency`: the client, read/write set, future graph, payload

pub use deferkv_concurrency::*;
pub use deferkv_core::{
    keys, ClientConfig, ClientId, Error, ExprError, ReadContext, ReadResult, Result, Store,
    StoreError, StoreResult, TransactionId, CONFIG_FILE_NAME,
};
pub use deferkv_storage::{MemoryStore, ReadStats};
