//! Optimistic transactions.

mod state;

pub use state::TransactionState;

use crate::db::Shared;
use crate::error::{CoreError, CoreResult};
use crate::intention::Intention;
use crate::snapshot::Snapshot;
use logtree_log::Position;
use std::fmt;
use std::sync::Arc;

/// A transaction over one snapshot.
///
/// Operations build an [`Intention`] privately; nothing is shared until
/// [`commit`](Self::commit) appends it to the log and waits for the log
/// processor to validate it.
///
/// # Example
///
/// ```rust
/// use logtree_core::Db;
///
/// let db = Db::open_in_memory().unwrap();
/// let mut txn = db.begin_transaction().unwrap();
/// txn.put(b"a".to_vec(), b"1".to_vec()).unwrap();
/// assert!(txn.commit().unwrap());
/// assert_eq!(db.get(b"a"), Some(b"1".to_vec()));
/// ```
pub struct TransactionImpl {
    shared: Arc<Shared>,
    snapshot: Arc<Snapshot>,
    intention: Option<Intention>,
    state: TransactionState,
    position: Option<Position>,
}

impl fmt::Debug for TransactionImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionImpl")
            .field("snapshot", &self.snapshot.position())
            .field("state", &self.state)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl TransactionImpl {
    pub(crate) fn new(shared: Arc<Shared>, snapshot: Arc<Snapshot>) -> CoreResult<Self> {
        let intention = Intention::new(snapshot.root(), snapshot.position())?;
        shared.stats().record_transaction_start();
        Ok(Self {
            shared,
            snapshot,
            intention: Some(intention),
            state: TransactionState::Building,
            position: None,
        })
    }

    /// Writes `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` once the transaction has left `Building`.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> CoreResult<()> {
        self.intention_mut("put")?.put(key.into(), value.into())
    }

    /// Removes `key`. Returns whether it was present.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` once the transaction has left `Building`.
    pub fn delete(&mut self, key: &[u8]) -> CoreResult<bool> {
        self.intention_mut("delete")?.delete(key)
    }

    /// Reads `key`, seeing this transaction's own writes.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` once the transaction has left `Building`.
    pub fn get(&mut self, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.intention_mut("get")?.get(key))
    }

    /// Appends the intention and waits for its validation.
    ///
    /// Returns `Ok(true)` if it committed and `Ok(false)` if it conflicted
    /// with an earlier commit. A transaction that wrote nothing commits
    /// without touching the log.
    ///
    /// # Errors
    ///
    /// - `ProtocolViolation` if called twice
    /// - `DatabaseClosed` if the database shut down first
    /// - `CorruptPayload` or `Storage` if the intention could not be applied
    pub fn commit(&mut self) -> CoreResult<bool> {
        self.state.ensure_building("commit")?;
        let intention = self
            .intention
            .take()
            .ok_or_else(|| CoreError::protocol_violation("transaction has no intention"))?;
        self.state = TransactionState::Committing;

        if intention.is_empty() {
            self.shared.stats().record_read_only_commit();
            self.state = TransactionState::Committed;
            return Ok(true);
        }

        match self.shared.commit(intention) {
            Ok((position, committed)) => {
                self.position = Some(position);
                self.state = if committed {
                    TransactionState::Committed
                } else {
                    TransactionState::Aborted
                };
                Ok(committed)
            }
            Err(e) => {
                self.state = TransactionState::Aborted;
                Err(e)
            }
        }
    }

    /// Abandons the transaction.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` if the transaction is not building.
    pub fn abort(&mut self) -> CoreResult<()> {
        self.state.ensure_building("abort")?;
        self.intention = None;
        self.state = TransactionState::Aborted;
        Ok(())
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// The snapshot this transaction reads.
    #[must_use]
    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    /// Log position of the intention, once appended.
    #[must_use]
    pub fn position(&self) -> Option<Position> {
        self.position
    }

    fn intention_mut(&mut self, operation: &str) -> CoreResult<&mut Intention> {
        self.state.ensure_building(operation)?;
        self.intention
            .as_mut()
            .ok_or_else(|| CoreError::protocol_violation("transaction has no intention"))
    }
}
