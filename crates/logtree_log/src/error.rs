//! Error types for log operations.

use std::io;
use thiserror::Error;

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors that can occur while talking to the log.
#[derive(Debug, Error)]
pub enum LogError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The position has not been written (and was not filled).
    #[error("position {position} not written (tail {tail})")]
    NotWritten {
        /// The requested position.
        position: u64,
        /// The log tail at the time of the read.
        tail: u64,
    },

    /// The position already holds data, so it cannot be filled or rewritten.
    #[error("position {position} already written")]
    AlreadyWritten {
        /// The contested position.
        position: u64,
    },

    /// The position was filled and cannot be written.
    #[error("position {position} was filled")]
    Filled {
        /// The filled position.
        position: u64,
    },

    /// The log contents are structurally invalid.
    #[error("log corrupted: {0}")]
    Corrupted(String),

    /// A stored checksum does not match the entry.
    #[error("checksum mismatch at byte offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Byte offset of the offending frame.
        offset: u64,
        /// Checksum stored in the frame.
        expected: u32,
        /// Checksum computed over the frame.
        actual: u32,
    },

    /// Another process holds the log file.
    #[error("log locked: another process has exclusive access")]
    Locked,
}

impl LogError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}
