//! Error types for logtree core.

use crate::types::NodeAddr;
use logtree_log::Position;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in logtree core operations.
///
/// A transaction that loses validation is not an error: `commit` reports it
/// as `Ok(false)`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A node or transaction was used in a state that forbids the operation.
    #[error("protocol violation: {message}")]
    ProtocolViolation {
        /// What was attempted.
        message: String,
    },

    /// The intention at a position cannot be decoded or applied.
    #[error("corrupt payload at position {position}: {message}")]
    CorruptPayload {
        /// The offending log position.
        position: Position,
        /// Description of the problem.
        message: String,
    },

    /// The log failed.
    #[error("storage error: {0}")]
    Storage(#[from] logtree_log::LogError),

    /// An intention could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] logtree_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The address is neither cached nor produced by any committed intention
    /// this instance has seen.
    #[error("node {addr} cannot be resolved")]
    Unresolvable {
        /// The address that failed to resolve.
        addr: NodeAddr,
    },

    /// The database has been closed.
    #[error("database is closed")]
    DatabaseClosed,
}

impl CoreError {
    /// Creates a protocol violation error.
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
        }
    }

    /// Creates a corrupt payload error.
    pub fn corrupt_payload(position: Position, message: impl Into<String>) -> Self {
        Self::CorruptPayload {
            position,
            message: message.into(),
        }
    }
}
