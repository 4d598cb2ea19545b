//! Node pointers.

use super::Node;
use crate::types::NodeAddr;
use std::cmp::Ordering;
use std::sync::Arc;

/// Reference to a node.
///
/// Cloning a pointer never grants mutable access to the node behind it.
/// Resolution ([`crate::NodeCache::resolve`]) turns `Unresolved` into
/// `Resolved` and leaves the other two states untouched.
#[derive(Debug, Clone, Default)]
pub enum NodePtr {
    /// The shared empty leaf. Always black.
    #[default]
    Nil,
    /// A node in memory.
    Resolved(Arc<Node>),
    /// A node known only by its address.
    Unresolved(NodeAddr),
}

impl NodePtr {
    /// Returns true for the empty leaf.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Returns true if the pointer is bound to a node in memory.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Returns the node if resolved.
    #[must_use]
    pub fn node(&self) -> Option<&Arc<Node>> {
        match self {
            Self::Resolved(node) => Some(node),
            Self::Nil | Self::Unresolved(_) => None,
        }
    }

    /// Returns the address of the node, resolved or not.
    #[must_use]
    pub fn addr(&self) -> Option<NodeAddr> {
        match self {
            Self::Nil => None,
            Self::Resolved(node) => Some(node.addr()),
            Self::Unresolved(addr) => Some(*addr),
        }
    }

    /// Returns true if the pointer refers to a red node in memory.
    #[must_use]
    pub fn is_red(&self) -> bool {
        self.node().is_some_and(|node| node.is_red())
    }

    /// Finds the node holding `key` in the subtree below this pointer.
    #[must_use]
    pub fn find(&self, key: &[u8]) -> Option<&Arc<Node>> {
        let mut cursor = self.node();
        while let Some(node) = cursor {
            cursor = match key.cmp(node.key()) {
                Ordering::Less => node.left().node(),
                Ordering::Greater => node.right().node(),
                Ordering::Equal => return Some(node),
            };
        }
        None
    }
}

impl From<Arc<Node>> for NodePtr {
    fn from(node: Arc<Node>) -> Self {
        Self::Resolved(node)
    }
}

impl From<NodeAddr> for NodePtr {
    fn from(addr: NodeAddr) -> Self {
        Self::Unresolved(addr)
    }
}
