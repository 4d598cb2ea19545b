//! Immutable views of a committed tree.

use crate::node::{Node, NodePtr};
use crate::types::Version;
use logtree_log::Position;
use std::sync::Arc;

/// A committed tree and the log point it reflects.
///
/// Snapshots are shared as `Arc<Snapshot>` and never change. Every node
/// below the root is resolved.
#[derive(Debug, Clone)]
pub struct Snapshot {
    root: NodePtr,
    position: Option<Position>,
    version: Version,
    description: Vec<String>,
}

impl Snapshot {
    /// The empty tree, before anything was committed.
    #[must_use]
    pub fn empty(description: Vec<String>) -> Self {
        Self {
            root: NodePtr::Nil,
            position: None,
            version: 0,
            description,
        }
    }

    pub(crate) fn new(
        root: NodePtr,
        position: Position,
        version: Version,
        description: Vec<String>,
    ) -> Self {
        Self {
            root,
            position: Some(position),
            version,
            description,
        }
    }

    /// Root of the tree.
    #[must_use]
    pub fn root(&self) -> &NodePtr {
        &self.root
    }

    /// Position of the last intention this snapshot reflects.
    #[must_use]
    pub fn position(&self) -> Option<Position> {
        self.position
    }

    /// Running version counter at this point.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Description lines.
    #[must_use]
    pub fn description(&self) -> &[String] {
        &self.description
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.root.find(key).map(|node| node.value())
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.root.find(key).is_some()
    }

    /// Content version of `key`, or `None` if it is absent.
    #[must_use]
    pub fn version_of(&self, key: &[u8]) -> Option<Version> {
        self.root.find(key).map(|node| node.nsv())
    }

    /// Iterates over all entries in key order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        let mut iter = Iter { stack: Vec::new() };
        iter.push_left(&self.root);
        iter
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns true if the tree is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_nil()
    }

    /// Checks the red-black rules:
    ///
    /// - the root is black
    /// - no red node has a red child
    /// - every root-to-leaf path has the same number of black nodes
    /// - keys are strictly increasing in order
    ///
    /// Returns the black height.
    ///
    /// # Errors
    ///
    /// Describes the first violation found.
    pub fn check_invariants(&self) -> Result<usize, String> {
        if self.root.is_red() {
            return Err("root is red".to_string());
        }
        check_subtree(&self.root, None, None)
    }
}

fn check_subtree(
    ptr: &NodePtr,
    lower: Option<&[u8]>,
    upper: Option<&[u8]>,
) -> Result<usize, String> {
    let node = match ptr {
        NodePtr::Nil => return Ok(0),
        NodePtr::Resolved(node) => node,
        NodePtr::Unresolved(addr) => return Err(format!("node {addr} is not resolved")),
    };
    let below = lower.is_some_and(|lower| node.key() <= lower);
    let above = upper.is_some_and(|upper| node.key() >= upper);
    if below || above {
        return Err(format!(
            "key {:?} out of order",
            String::from_utf8_lossy(node.key())
        ));
    }
    if node.is_red() && (node.left().is_red() || node.right().is_red()) {
        return Err(format!(
            "red node {:?} has a red child",
            String::from_utf8_lossy(node.key())
        ));
    }
    let left = check_subtree(node.left(), lower, Some(node.key()))?;
    let right = check_subtree(node.right(), Some(node.key()), upper)?;
    if left != right {
        return Err(format!(
            "black height differs below {:?}: {left} vs {right}",
            String::from_utf8_lossy(node.key())
        ));
    }
    Ok(left + usize::from(!node.is_red()))
}

/// In-order iterator over a snapshot.
#[derive(Debug)]
pub struct Iter<'a> {
    stack: Vec<&'a Arc<Node>>,
}

impl<'a> Iter<'a> {
    fn push_left(&mut self, mut ptr: &'a NodePtr) {
        while let Some(node) = ptr.node() {
            self.stack.push(node);
            ptr = node.left();
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left(node.right());
        Some((node.key(), node.value()))
    }
}
