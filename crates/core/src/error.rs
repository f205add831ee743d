//! Error types for deferkv
//!
//! Errors fall into three classes:
//! - **Retryable**: the store rejected the commit. The caller restarts the
//!   transaction body from `begin()`.
//! - **Precondition**: a programming error in the caller (a key touched twice,
//!   a call in the wrong lifecycle state, a malformed expression). Never retried.
//! - **Fatal**: transport or encoding failures. Surfaced immediately.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for deferkv operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for raw store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Error types for the transaction client
#[derive(Debug, Error)]
pub enum Error {
    /// The store refused the commit (create-if-absent returned false)
    ///
    /// This is the only recoverable error: the next `begin()` reuses the same
    /// transaction id and the caller re-runs the transaction body.
    #[error("Transaction aborted: {reason}")]
    TransactionAborted {
        /// Human-readable reason for the rejection
        reason: String,
    },

    /// A key was accessed more than once in the same transaction
    #[error("Key accessed twice in one transaction: {key}")]
    DuplicateAccess {
        /// The offending key
        key: String,
    },

    /// Operation called in the wrong lifecycle state
    #[error("Cannot {operation} while transaction is {state}")]
    InvalidState {
        /// Operation that was attempted
        operation: &'static str,
        /// Current state, rendered for diagnostics
        state: String,
    },

    /// A reference-data read found no value
    #[error("Expected key is missing from the store: {key}")]
    MissingKey {
        /// Key that was expected to exist
        key: String,
    },

    /// A future handle does not address a node of the graph
    #[error("Future handle {index} out of range (graph has {len} nodes)")]
    InvalidHandle {
        /// Index carried by the handle
        index: usize,
        /// Number of nodes in the graph
        len: usize,
    },

    /// An opcode was used where it is not valid
    #[error("Invalid opcode {opcode} for {context}")]
    InvalidOpcode {
        /// Opcode name
        opcode: String,
        /// Where the opcode was found
        context: &'static str,
    },

    /// A read node was resolved but its key is not in the supplied environment
    #[error("Read of '{key}' has no binding in the resolution environment")]
    UnboundRead {
        /// Key of the unbound read
        key: String,
    },

    /// An expression could not be evaluated
    #[error("Expression error: {0}")]
    Expression(#[from] ExprError),

    /// The store transport failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build an `InvalidState` error from any debuggable state
    pub fn invalid_state(operation: &'static str, state: impl std::fmt::Debug) -> Self {
        Error::InvalidState {
            operation,
            state: format!("{:?}", state),
        }
    }

    /// Whether the caller should re-run the transaction from `begin()`
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransactionAborted { .. })
    }

    /// Whether this error is a caller contract violation
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::DuplicateAccess { .. }
                | Error::InvalidState { .. }
                | Error::MissingKey { .. }
                | Error::InvalidHandle { .. }
                | Error::InvalidOpcode { .. }
                | Error::UnboundRead { .. }
                | Error::Expression(_)
        )
    }
}

/// Errors raised while evaluating a future expression
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExprError {
    /// An operand did not parse as the numeric type the opcode requires
    #[error("Operand '{value}' is not a valid {expected}")]
    NotANumber {
        /// Raw operand text
        value: String,
        /// Expected numeric type ("integer" or "float")
        expected: &'static str,
    },

    /// An arithmetic or string operator received the absent marker
    #[error("Future {index} resolved to an absent value")]
    AbsentOperand {
        /// Index of the node whose value was absent
        index: usize,
    },

    /// A stored value is not valid UTF-8 text
    #[error("Future {index} resolved to non-UTF-8 bytes")]
    InvalidUtf8 {
        /// Index of the node whose value was not text
        index: usize,
    },

    /// `EXISTS` was applied to something other than a read
    #[error("EXISTS operand {index} is not a read")]
    NotARead {
        /// Index of the operand node
        index: usize,
    },

    /// Integer arithmetic left the range of a 64-bit signed integer
    #[error("Integer overflow in future {index}")]
    Overflow {
        /// Index of the node whose result overflowed
        index: usize,
    },

    /// A predicate must depend on exactly one key
    #[error("Predicate depends on {count} keys, expected exactly one")]
    PredicateKeys {
        /// Number of keys the expression depends on
        count: usize,
    },
}

/// Transport-level failures reported by a `Store` implementation
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error on the underlying connection
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Connection could not be established or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// The store did not reply in time
    #[error("Store operation timed out")]
    Timeout,

    /// The store replied with something the client cannot interpret
    #[error("Protocol error: {0}")]
    Protocol(String),
}
