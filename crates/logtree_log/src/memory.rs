//! In-memory log for tests and ephemeral stores.

use crate::error::{LogError, LogResult};
use crate::log::{Log, LogEntry, Position};
use parking_lot::RwLock;

#[derive(Debug, Clone)]
enum Slot {
    /// Allocated but never written (a hole).
    Empty,
    Data(Vec<u8>),
    Filled,
}

/// An in-memory log.
///
/// Suitable for:
/// - Unit and integration tests
/// - Ephemeral stores that don't need persistence
///
/// Besides the [`Log`] contract it can [`reserve`](Self::reserve) a position
/// without writing it, which is how tests reproduce a writer that died
/// between sequencing and writing.
///
/// # Example
///
/// ```rust
/// use logtree_log::{InMemoryLog, Log};
///
/// let log = InMemoryLog::new();
/// assert_eq!(log.append(b"a").unwrap(), 0);
/// assert_eq!(log.append(b"b").unwrap(), 1);
/// assert_eq!(log.tail().unwrap(), 2);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryLog {
    slots: RwLock<Vec<Slot>>,
}

impl InMemoryLog {
    /// Creates a new empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log whose first positions hold the given payloads.
    ///
    /// Useful for replay tests.
    #[must_use]
    pub fn with_entries(entries: Vec<Vec<u8>>) -> Self {
        Self {
            slots: RwLock::new(entries.into_iter().map(Slot::Data).collect()),
        }
    }

    /// Allocates the next position without writing it.
    pub fn reserve(&self) -> Position {
        let mut slots = self.slots.write();
        slots.push(Slot::Empty);
        (slots.len() - 1) as Position
    }

    /// Writes a payload into a previously reserved position.
    ///
    /// # Errors
    ///
    /// Fails if the position is beyond the tail, already written, or filled.
    pub fn write(&self, position: Position, payload: &[u8]) -> LogResult<()> {
        let mut slots = self.slots.write();
        let tail = slots.len() as u64;
        let slot = slots
            .get_mut(position as usize)
            .ok_or(LogError::NotWritten { position, tail })?;
        match slot {
            Slot::Empty => {
                *slot = Slot::Data(payload.to_vec());
                Ok(())
            }
            Slot::Data(_) => Err(LogError::AlreadyWritten { position }),
            Slot::Filled => Err(LogError::Filled { position }),
        }
    }

    /// Returns the number of allocated positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Returns true if nothing was ever allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

impl Log for InMemoryLog {
    fn append(&self, payload: &[u8]) -> LogResult<Position> {
        let mut slots = self.slots.write();
        let position = slots.len() as Position;
        slots.push(Slot::Data(payload.to_vec()));
        Ok(position)
    }

    fn read(&self, position: Position) -> LogResult<LogEntry> {
        let slots = self.slots.read();
        let tail = slots.len() as u64;
        match slots.get(position as usize) {
            Some(Slot::Data(bytes)) => Ok(LogEntry::Data(bytes.clone())),
            Some(Slot::Filled) => Ok(LogEntry::Filled),
            Some(Slot::Empty) | None => Err(LogError::NotWritten { position, tail }),
        }
    }

    fn fill(&self, position: Position) -> LogResult<()> {
        let mut slots = self.slots.write();
        let index = position as usize;
        if index >= slots.len() {
            slots.resize(index + 1, Slot::Empty);
        }
        match &slots[index] {
            Slot::Data(_) => Err(LogError::AlreadyWritten { position }),
            Slot::Filled => Ok(()),
            Slot::Empty => {
                slots[index] = Slot::Filled;
                Ok(())
            }
        }
    }

    fn tail(&self) -> LogResult<Position> {
        Ok(self.slots.read().len() as Position)
    }
}
