//! Log trait definition.

use crate::error::LogResult;
use std::sync::Arc;

/// A position in the log.
///
/// Positions are handed out by the log in strictly increasing order and are
/// never reused.
pub type Position = u64;

/// What occupies a written position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// A payload appended by a writer.
    Data(Vec<u8>),
    /// A deliberate no-op written by `fill`.
    Filled,
}

impl LogEntry {
    /// Returns the payload if this entry carries data.
    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(bytes) => Some(bytes),
            Self::Filled => None,
        }
    }

    /// Returns true if the position was filled.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        matches!(self, Self::Filled)
    }
}

/// An append-only log with externally ordered positions.
///
/// Logs are **opaque payload stores**. logtree owns the interpretation of
/// every payload; the log only orders and stores them.
///
/// # Invariants
///
/// - `append` returns a position strictly greater than every position it
///   returned before, and never returns a filled position
/// - `read` of an appended position returns exactly the appended bytes
/// - a position holds either data or a fill marker, never both, and never
///   changes once decided
/// - implementations must be `Send + Sync`; all methods take `&self`
pub trait Log: Send + Sync {
    /// Appends a payload at the next position and returns that position.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage fails.
    fn append(&self, payload: &[u8]) -> LogResult<Position>;

    /// Reads the entry at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LogError::NotWritten`] if nothing has been decided at
    /// `position` yet, or a storage error.
    fn read(&self, position: Position) -> LogResult<LogEntry>;

    /// Marks `position` as a deliberate no-op.
    ///
    /// Succeeds if the position was unwritten or was already filled.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LogError::AlreadyWritten`] if a writer got there
    /// first, or a storage error.
    fn fill(&self, position: Position) -> LogResult<()>;

    /// Returns the next position `append` will allocate.
    ///
    /// # Errors
    ///
    /// Returns an error if the tail cannot be determined.
    fn tail(&self) -> LogResult<Position>;
}

impl<L: Log + ?Sized> Log for Arc<L> {
    fn append(&self, payload: &[u8]) -> LogResult<Position> {
        (**self).append(payload)
    }

    fn read(&self, position: Position) -> LogResult<LogEntry> {
        (**self).read(position)
    }

    fn fill(&self, position: Position) -> LogResult<()> {
        (**self).fill(position)
    }

    fn tail(&self) -> LogResult<Position> {
        (**self).tail()
    }
}
