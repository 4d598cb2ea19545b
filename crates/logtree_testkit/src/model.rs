//! Reference model for committed state.
//!
//! A `Model` is a plain ordered map. Running the same operations through the
//! model and through a database must leave both holding the same pairs.

use crate::generators::Op;
use logtree_core::{Db, Snapshot};
use std::collections::BTreeMap;

/// An ordered map standing in for the committed tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `key`, if present.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the model holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_slice(), value.as_slice()))
    }

    /// Applies the writes of `ops` as one committed transaction.
    pub fn apply(&mut self, ops: &[Op]) {
        for op in ops {
            match op {
                Op::Put(key, value) => {
                    self.entries.insert(key.clone(), value.clone());
                }
                Op::Delete(key) => {
                    self.entries.remove(key);
                }
                Op::Get(_) => {}
            }
        }
    }

    /// Runs `ops` as one transaction on `db`, checking every read and delete
    /// against the model as it goes. The model takes the writes only if the
    /// transaction commits.
    ///
    /// # Panics
    ///
    /// Panics if the database fails or disagrees with the model.
    pub fn execute(&mut self, db: &Db, ops: &[Op]) -> bool {
        let mut staged = self.clone();
        let mut txn = db.begin_transaction().expect("Failed to begin");

        for op in ops {
            match op {
                Op::Put(key, value) => {
                    txn.put(key.clone(), value.clone()).expect("Failed to put");
                }
                Op::Delete(key) => {
                    let removed = txn.delete(key).expect("Failed to delete");
                    assert_eq!(
                        removed,
                        staged.get(key).is_some(),
                        "delete of {key:?} disagrees with the model"
                    );
                }
                Op::Get(key) => {
                    let actual = txn.get(key).expect("Failed to get");
                    assert_eq!(
                        actual.as_deref(),
                        staged.get(key),
                        "read of {key:?} disagrees with the model"
                    );
                }
            }
            staged.apply(std::slice::from_ref(op));
        }

        let committed = txn.commit().expect("Failed to commit");
        if committed {
            *self = staged;
        }
        committed
    }

    /// Compares the model with `snapshot`, pair by pair, and checks the
    /// snapshot's tree invariants.
    ///
    /// # Errors
    ///
    /// Describes the first difference found.
    pub fn verify(&self, snapshot: &Snapshot) -> Result<(), String> {
        snapshot.check_invariants()?;
        if snapshot.len() != self.len() {
            return Err(format!(
                "snapshot holds {} keys, model holds {}",
                snapshot.len(),
                self.len()
            ));
        }
        for ((key, value), (expected_key, expected_value)) in snapshot.iter().zip(self.iter()) {
            if key != expected_key {
                return Err(format!("key {key:?} where model has {expected_key:?}"));
            }
            if value != expected_value {
                return Err(format!("value mismatch for {key:?}"));
            }
        }
        Ok(())
    }

    /// Asserts that the committed state of `db` matches the model.
    ///
    /// # Panics
    ///
    /// Panics on any difference.
    pub fn assert_matches(&self, db: &Db) {
        if let Err(message) = self.verify(&db.snapshot()) {
            panic!("database disagrees with model: {message}");
        }
    }
}
