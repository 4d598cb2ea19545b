//! # logtree Testkit
//!
//! Test utilities for logtree.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - Property-based test generators using proptest
//! - A reference model to check committed state against
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use logtree_testkit::prelude::*;
//!
//! with_temp_db(|db| {
//!     let mut txn = db.begin_transaction().unwrap();
//!     txn.put(b"k".to_vec(), b"v".to_vec()).unwrap();
//!     assert!(txn.commit().unwrap());
//!     assert_eq!(db.get(b"k"), Some(b"v".to_vec()));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod model;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::model::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use model::*;
pub use stress::*;
