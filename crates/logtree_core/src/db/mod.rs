//! The database handle and its commit pipeline.
//!
//! Writers append their intention to the log and then block until a single
//! background thread, the log processor, has decided that position. The
//! processor walks the log in position order, validates each intention
//! against the last committed state, and publishes the new tree.

mod processor;

use crate::cache::NodeCache;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::intention::Intention;
use crate::snapshot::Snapshot;
use crate::stats::{DbStats, StatsSnapshot};
use crate::transaction::TransactionImpl;
use logtree_codec::{Encode, IntentionRecord};
use logtree_log::{FileLog, InMemoryLog, Log, LogError, Position};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

/// What the log processor decided about one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The intention validated and is part of the tree.
    Committed,
    /// The intention conflicted with an earlier commit.
    Conflict,
    /// The position was filled; nothing was applied.
    Filled,
    /// The payload could not be decoded or applied.
    Corrupt(String),
}

impl Decision {
    /// Returns true for [`Decision::Committed`].
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }

    /// Converts into what `commit` reports for the intention at `position`.
    ///
    /// # Errors
    ///
    /// `CorruptPayload` for a corrupt position, `Storage` wrapping
    /// [`LogError::Filled`] for a filled one.
    pub fn into_outcome(self, position: Position) -> CoreResult<bool> {
        match self {
            Self::Committed => Ok(true),
            Self::Conflict => Ok(false),
            Self::Filled => Err(CoreError::Storage(LogError::Filled { position })),
            Self::Corrupt(message) => Err(CoreError::corrupt_payload(position, message)),
        }
    }
}

/// Commit state guarded by one lock.
struct State {
    /// Last committed state.
    lcs: Arc<Snapshot>,
    /// Next position the processor will decide.
    next: Position,
    /// Records appended by this instance, waiting for the processor.
    staged: HashMap<Position, IntentionRecord>,
    decisions: BTreeMap<Position, Decision>,
    shutdown: bool,
}

/// Everything the processor thread and transactions share.
pub(crate) struct Shared {
    log: Arc<dyn Log>,
    cache: NodeCache,
    config: Config,
    state: Mutex<State>,
    /// Wakes the processor.
    work: Condvar,
    /// Wakes threads waiting for a decision.
    decided: Condvar,
    stats: DbStats,
}

impl Shared {
    pub(crate) fn stats(&self) -> &DbStats {
        &self.stats
    }

    /// Appends `intention` and blocks until its position is decided.
    pub(crate) fn commit(&self, intention: Intention) -> CoreResult<(Position, bool)> {
        let mut record = intention.freeze()?;
        let bytes = record.encode()?;

        if self.state.lock().shutdown {
            return Err(CoreError::DatabaseClosed);
        }
        let position = self.log.append(&bytes)?;
        self.stats.record_append(bytes.len() as u64);
        tracing::debug!(
            position,
            snapshot = ?record.snapshot,
            nodes = record.nodes.len(),
            bytes = bytes.len(),
            "appended intention"
        );

        record.stamp(position);
        {
            let mut state = self.state.lock();
            if state.next <= position {
                state.staged.insert(position, record);
            }
        }
        self.work.notify_one();

        let committed = self.wait_for(position)?.into_outcome(position)?;
        if committed {
            self.stats.record_commit();
        } else {
            self.stats.record_abort();
        }
        Ok((position, committed))
    }

    fn wait_for(&self, position: Position) -> CoreResult<Decision> {
        let mut state = self.state.lock();
        loop {
            if let Some(decision) = state.decisions.get(&position) {
                return Ok(decision.clone());
            }
            if state.shutdown {
                return Err(CoreError::DatabaseClosed);
            }
            self.work.notify_one();
            self.decided.wait(&mut state);
        }
    }

    fn sync(&self) -> CoreResult<()> {
        let tail = self.log.tail()?;
        let mut state = self.state.lock();
        while state.next < tail {
            if state.shutdown {
                return Err(CoreError::DatabaseClosed);
            }
            self.work.notify_one();
            self.decided.wait(&mut state);
        }
        Ok(())
    }

    fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.work.notify_all();
        self.decided.notify_all();
    }
}

/// A logtree database.
///
/// Owns the log processor thread, which is stopped when the database is
/// closed or dropped.
///
/// # Example
///
/// ```rust
/// use logtree_core::Db;
///
/// let db = Db::open_in_memory().unwrap();
///
/// let mut txn = db.begin_transaction().unwrap();
/// txn.put(b"k".to_vec(), b"v".to_vec()).unwrap();
/// assert!(txn.commit().unwrap());
///
/// let snapshot = db.snapshot();
/// assert_eq!(snapshot.get(b"k"), Some(&b"v"[..]));
/// assert_eq!(snapshot.position(), Some(0));
/// ```
pub struct Db {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("position", &self.position())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl Db {
    /// Opens a database over `log`, replaying everything already in it.
    ///
    /// # Errors
    ///
    /// Returns an error if the processor thread cannot be started or the
    /// replay fails.
    pub fn open(log: Arc<dyn Log>, config: Config) -> CoreResult<Self> {
        let cache = NodeCache::new(Arc::clone(&log), config.node_cache_capacity);
        let lcs = Arc::new(Snapshot::empty(config.description.clone()));
        let shared = Arc::new(Shared {
            log,
            cache,
            config,
            state: Mutex::new(State {
                lcs,
                next: 0,
                staged: HashMap::new(),
                decisions: BTreeMap::new(),
                shutdown: false,
            }),
            work: Condvar::new(),
            decided: Condvar::new(),
            stats: DbStats::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("logtree-processor".into())
            .spawn(move || processor::run(&worker_shared))?;

        let db = Self {
            shared,
            worker: Mutex::new(Some(worker)),
        };
        db.sync()?;
        tracing::info!(
            position = ?db.position(),
            entries = db.snapshot().len(),
            "opened database"
        );
        Ok(db)
    }

    /// Opens a database over a fresh in-memory log.
    ///
    /// # Errors
    ///
    /// See [`Db::open`].
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open(Arc::new(InMemoryLog::new()), Config::default())
    }

    /// Opens a database over a file log at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or replayed.
    pub fn open_file(path: &Path, config: Config) -> CoreResult<Self> {
        let log = FileLog::open_with_options(path, config.sync_on_append)?;
        Self::open(Arc::new(log), config)
    }

    /// The configuration the database was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// The underlying log.
    #[must_use]
    pub fn log(&self) -> &Arc<dyn Log> {
        &self.shared.log
    }

    /// The node cache.
    #[must_use]
    pub fn cache(&self) -> &NodeCache {
        &self.shared.cache
    }

    /// The last committed state.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.shared.state.lock().lcs)
    }

    /// Position of the last committed intention.
    #[must_use]
    pub fn position(&self) -> Option<Position> {
        self.shared.state.lock().lcs.position()
    }

    /// Starts a transaction on the last committed state.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after [`Db::close`].
    pub fn begin_transaction(&self) -> CoreResult<TransactionImpl> {
        self.begin_at(self.snapshot())
    }

    /// Starts a transaction on an earlier snapshot.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after [`Db::close`].
    pub fn begin_at(&self, snapshot: Arc<Snapshot>) -> CoreResult<TransactionImpl> {
        if self.shared.state.lock().shutdown {
            return Err(CoreError::DatabaseClosed);
        }
        TransactionImpl::new(Arc::clone(&self.shared), snapshot)
    }

    /// Reads `key` from the last committed state.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.snapshot().get(key).map(<[u8]>::to_vec)
    }

    /// Returns the decision for `position`, if it has been made.
    #[must_use]
    pub fn decision(&self, position: Position) -> Option<Decision> {
        self.shared.state.lock().decisions.get(&position).cloned()
    }

    /// Blocks until `position` is decided.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` if the database shuts down first.
    pub fn wait_for(&self, position: Position) -> CoreResult<Decision> {
        self.shared.wait_for(position)
    }

    /// Blocks until every position below the current tail is decided.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` if the database shuts down first, or a
    /// storage error reading the tail.
    pub fn sync(&self) -> CoreResult<()> {
        self.shared.sync()
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot(self.shared.cache.stats())
    }

    /// Decides everything already appended, then stops the processor.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails. The processor is stopped
    /// either way.
    pub fn close(&self) -> CoreResult<()> {
        let result = self.sync();
        self.stop();
        tracing::info!(position = ?self.position(), "closed database");
        result
    }

    fn stop(&self) {
        self.shared.shutdown();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("log processor panicked");
            }
        }
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        self.stop();
    }
}
