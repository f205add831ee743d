//! Core types for deferkv
//!
//! This module defines the foundational types:
//! - ClientId: Unique identifier for a transaction client
//! - TransactionId: Identity of one transaction attempt (client + sequence)
//! - ReadResult: Concrete outcome of a store read

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a transaction client
///
/// A ClientId is a wrapper around a UUID v4. Every `TransactionClient`
/// draws a fresh one, so transaction ids from different clients never
/// collide even when their sequence numbers do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Create a new random ClientId using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a ClientId from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse a ClientId from a string representation
    ///
    /// Accepts standard UUID format (with or without hyphens).
    ///
    /// # Errors
    /// Returns None if the string is not a valid UUID.
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the raw bytes of this ClientId
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a transaction attempt
///
/// Rendered as `"<sequence>-<client>"`. The `-` separator sorts before every
/// alphanumeric character, so ids of one client order by sequence number
/// when their decimal widths match.
///
/// The sequence starts at 1 and advances only when an attempt finishes
/// (commit or explicit abort). A retry after a commit rejection reuses the
/// id verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId {
    /// Client that issued the transaction
    pub client: ClientId,
    /// Per-client sequence number, starting at 1
    pub sequence: u64,
}

impl TransactionId {
    /// Separator between sequence and client id
    pub const SEPARATOR: char = '-';

    /// Create a transaction id
    pub fn new(client: ClientId, sequence: u64) -> Self {
        Self { client, sequence }
    }

    /// Store key under which the transaction is committed
    pub fn to_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.sequence, Self::SEPARATOR, self.client)
    }
}

/// Concrete result of reading one key from the store
///
/// Version 0 means the key did not exist when read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResult {
    /// Whether the key existed
    pub existed: bool,
    /// Raw value bytes (empty when the key did not exist)
    pub value: Vec<u8>,
    /// Store version of the value (0 when the key did not exist)
    pub version: u64,
}

impl ReadResult {
    /// A read that found the key
    pub fn found(value: impl Into<Vec<u8>>, version: u64) -> Self {
        Self {
            existed: true,
            value: value.into(),
            version,
        }
    }

    /// A read that found nothing
    pub fn absent() -> Self {
        Self {
            existed: false,
            value: Vec::new(),
            version: 0,
        }
    }

    /// The value if the key existed
    pub fn value(&self) -> Option<&[u8]> {
        self.existed.then_some(self.value.as_slice())
    }
}
