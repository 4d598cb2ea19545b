//! Test fixtures and database helpers.

use logtree_core::{Config, Db};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// A database that cleans up after itself.
///
/// File-backed databases keep their temporary directory alive for as long
/// as the fixture exists.
pub struct TestDb {
    db: Db,
    path: Option<PathBuf>,
    _temp_dir: Option<TempDir>,
}

impl TestDb {
    /// Opens an in-memory database with the test configuration.
    pub fn memory() -> Self {
        Self::memory_with(test_config())
    }

    /// Opens an in-memory database with `config`.
    pub fn memory_with(config: Config) -> Self {
        let log = std::sync::Arc::new(logtree_log::InMemoryLog::new());
        let db = Db::open(log, config).expect("Failed to open in-memory database");
        Self {
            db,
            path: None,
            _temp_dir: None,
        }
    }

    /// Opens a file-backed database in a fresh temporary directory.
    pub fn file() -> Self {
        Self::file_with(test_config())
    }

    /// Opens a file-backed database with `config`.
    pub fn file_with(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("tree.log");
        let db = Db::open_file(&path, config).expect("Failed to open file database");
        Self {
            db,
            path: Some(path),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Path of the log file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Closes the database and replays its log into a new instance.
    ///
    /// # Panics
    ///
    /// Panics for in-memory fixtures, which have nothing to reopen.
    pub fn reopen(self) -> Self {
        let Self {
            db,
            path,
            _temp_dir,
        } = self;
        let config = db.config().clone();
        db.close().expect("Failed to close database");
        drop(db);

        let path = path.expect("Only file databases can be reopened");
        let db = Db::open_file(&path, config).expect("Failed to reopen database");
        Self {
            db,
            path: Some(path),
            _temp_dir,
        }
    }

    /// Consumes the fixture, returning the database.
    ///
    /// The temporary directory of a file fixture is removed at this point,
    /// so only use this for in-memory databases.
    pub fn into_inner(self) -> Db {
        self.db
    }
}

impl std::ops::Deref for TestDb {
    type Target = Db;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Configuration tuned for tests: short polls and quick hole fills.
pub fn test_config() -> Config {
    Config::new()
        .poll_interval(Duration::from_millis(1))
        .hole_retry_limit(20)
        .description("test")
}

/// Runs a test with a temporary in-memory database.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Db) -> R,
{
    let test_db = TestDb::memory();
    f(&test_db)
}

/// Runs a test with a temporary file-based database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Db, &Path) -> R,
{
    let test_db = TestDb::file();
    let path = test_db
        .path()
        .expect("File database should have a path")
        .to_path_buf();
    f(&test_db, &path)
}

/// Commits a single put, panicking if it conflicts.
pub fn put_one(db: &Db, key: &[u8], value: &[u8]) {
    let mut txn = db.begin_transaction().expect("Failed to begin");
    txn.put(key.to_vec(), value.to_vec()).expect("Failed to put");
    assert!(txn.commit().expect("Failed to commit"), "put conflicted");
}

/// Common data sets.
pub mod scenarios {
    use super::put_one;
    use logtree_core::Db;

    /// Key `i` of the numbered data set.
    pub fn numbered_key(i: usize) -> Vec<u8> {
        format!("key-{i:05}").into_bytes()
    }

    /// Value `i` of the numbered data set.
    pub fn numbered_value(i: usize) -> Vec<u8> {
        format!("value-{i}").into_bytes()
    }

    /// Commits `count` numbered keys, one transaction each.
    pub fn populate_sequential(db: &Db, count: usize) {
        for i in 0..count {
            put_one(db, &numbered_key(i), &numbered_value(i));
        }
    }

    /// Commits `count` numbered keys in a single transaction.
    pub fn populate_batch(db: &Db, count: usize) {
        let mut txn = db.begin_transaction().expect("Failed to begin");
        for i in 0..count {
            txn.put(numbered_key(i), numbered_value(i))
                .expect("Failed to put");
        }
        assert!(txn.commit().expect("Failed to commit"), "batch conflicted");
    }

    /// Commits `count` numbered keys, then deletes every other one.
    pub fn populate_with_gaps(db: &Db, count: usize) {
        populate_batch(db, count);
        let mut txn = db.begin_transaction().expect("Failed to begin");
        for i in (0..count).step_by(2) {
            txn.delete(&numbered_key(i)).expect("Failed to delete");
        }
        assert!(txn.commit().expect("Failed to commit"), "deletes conflicted");
    }
}
