//! # logtree core
//!
//! A key-value store whose every revision is a copy-on-write red-black
//! tree, committed through a shared append-only log.
//!
//! This crate provides:
//! - Immutable tree nodes addressed by `(log position, offset)`
//! - A node cache that resolves addresses lazily from the log
//! - Intentions: a transaction's private copy-on-write change-set
//! - Optimistic transactions validated in log order by a single processor
//! - Snapshots of any committed state
//!
//! ## Commit protocol
//!
//! 1. A transaction reads and writes against a snapshot, building an
//!    [`Intention`]
//! 2. `commit` freezes the intention and appends it to the log
//! 3. The log processor visits positions in order and checks each intention
//!    against the last committed state: it commits if nothing it read,
//!    overwrote or deleted has changed since its snapshot
//! 4. A committed intention built on an older snapshot is melded onto the
//!    newer tree
//!
//! ## Example
//!
//! ```rust
//! use logtree_core::Db;
//!
//! let db = Db::open_in_memory().unwrap();
//!
//! let mut t1 = db.begin_transaction().unwrap();
//! let mut t2 = db.begin_transaction().unwrap();
//! assert_eq!(t1.get(b"x").unwrap(), None);
//! t1.put(b"x".to_vec(), b"1".to_vec()).unwrap();
//! t2.put(b"x".to_vec(), b"2".to_vec()).unwrap();
//!
//! assert!(t2.commit().unwrap());
//! // t1 read "x" before t2 wrote it.
//! assert!(!t1.commit().unwrap());
//! assert_eq!(db.get(b"x"), Some(b"2".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod db;
mod error;
mod intention;
mod node;
mod snapshot;
mod stats;
mod transaction;
mod types;

pub use cache::{CacheStats, NodeCache};
pub use config::Config;
pub use db::{Db, Decision};
pub use error::{CoreError, CoreResult};
pub use intention::Intention;
pub use node::{Color, Node, NodeBuilder, NodePtr};
pub use snapshot::{Iter, Snapshot};
pub use stats::{DbStats, StatsSnapshot};
pub use transaction::{TransactionImpl, TransactionState};
pub use types::{NodeAddr, Version};

pub use logtree_log::Position;
