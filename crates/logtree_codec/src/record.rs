//! Intention record types.

use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};

/// Current intention format version.
pub const FORMAT_VERSION: u16 = 1;

/// Reference from a node to one of its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildRef {
    /// The empty leaf.
    Nil,
    /// A node earlier in the same record.
    SelfRef {
        /// Index of the child in the record's node list.
        offset: u32,
    },
    /// A node committed at another log position.
    Explicit {
        /// Position of the record holding the child.
        csn: u64,
        /// Index of the child in that record.
        offset: u32,
    },
}

impl ChildRef {
    /// Returns true for the empty leaf.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Resolves the reference to a `(csn, offset)` address, given the
    /// position of the record it appears in.
    #[must_use]
    pub fn address(&self, pos: u64) -> Option<(u64, u32)> {
        match *self {
            Self::Nil => None,
            Self::SelfRef { offset } => Some((pos, offset)),
            Self::Explicit { csn, offset } => Some((csn, offset)),
        }
    }
}

/// One serialized tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Key bytes.
    #[serde(with = "serde_bytes")]
    pub key: Vec<u8>,
    /// Value bytes.
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
    /// Red (true) or black (false).
    pub red: bool,
    /// The value was written by this intention.
    pub altered: bool,
    /// The value was derived from a prior read of this key.
    pub depends: bool,
    /// Content version of the committed node this one was copied from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssv: Option<u64>,
    /// Whether the node reports `ssv` (true) or its own version (false).
    pub subtree_ro_dependent: bool,
    /// Left child.
    pub left: ChildRef,
    /// Right child.
    pub right: ChildRef,
}

impl NodeRecord {
    /// A fresh red leaf whose value was written by this intention.
    #[must_use]
    pub fn leaf(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            key,
            value,
            red: true,
            altered: true,
            depends: false,
            ssv: None,
            subtree_ro_dependent: false,
            left: ChildRef::Nil,
            right: ChildRef::Nil,
        }
    }
}

/// A key observed by the transaction and the content version it saw.
///
/// `version` is `None` when the key was absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRecord {
    /// Key bytes.
    #[serde(with = "serde_bytes")]
    pub key: Vec<u8>,
    /// Observed content version.
    pub version: Option<u64>,
}

/// The payload of one log position: a transaction's change-set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentionRecord {
    /// Format version of this record.
    pub format: u16,
    /// Position of the snapshot the transaction started from.
    pub snapshot: Option<u64>,
    /// Copied and created nodes in post-order; the root is last.
    pub nodes: Vec<NodeRecord>,
    /// Explicit reads.
    #[serde(default)]
    pub reads: Vec<ReadRecord>,
    /// Keys removed and the versions they had when removed.
    #[serde(default)]
    pub deletes: Vec<ReadRecord>,
}

impl IntentionRecord {
    /// Creates an empty record on top of `snapshot`.
    #[must_use]
    pub fn new(snapshot: Option<u64>) -> Self {
        Self {
            format: FORMAT_VERSION,
            snapshot,
            nodes: Vec::new(),
            reads: Vec::new(),
            deletes: Vec::new(),
        }
    }

    /// Offset of the root node, if the record has nodes.
    #[must_use]
    pub fn root_offset(&self) -> Option<u32> {
        self.nodes.len().checked_sub(1).map(|i| i as u32)
    }

    /// Returns true if the record carries no nodes and no deletes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.deletes.is_empty()
    }

    /// Rewrites every self reference as an explicit reference to `pos`.
    ///
    /// Called once the record's log position is known, so each node can be
    /// addressed without knowing which record it came from.
    pub fn stamp(&mut self, pos: u64) {
        for node in &mut self.nodes {
            for child in [&mut node.left, &mut node.right] {
                if let ChildRef::SelfRef { offset } = *child {
                    *child = ChildRef::Explicit { csn: pos, offset };
                }
            }
        }
    }

    /// Checks the structural rules a decoded record must satisfy.
    ///
    /// # Errors
    ///
    /// Fails on an unknown format version, or a self reference that does not
    /// point to an earlier node.
    pub fn validate(&self) -> CodecResult<()> {
        if self.format != FORMAT_VERSION {
            return Err(CodecError::UnsupportedVersion { found: self.format });
        }
        if u32::try_from(self.nodes.len()).is_err() {
            return Err(CodecError::invalid_structure("too many nodes"));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            for child in [&node.left, &node.right] {
                if let ChildRef::SelfRef { offset } = child {
                    if *offset as usize >= index {
                        return Err(CodecError::invalid_structure(format!(
                            "node {index} refers forward to node {offset}"
                        )));
                    }
                }
            }
            if !node.subtree_ro_dependent || node.ssv.is_some() {
                continue;
            }
            return Err(CodecError::invalid_structure(format!(
                "node {index} reports a source version it does not carry"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_address() {
        assert_eq!(ChildRef::Nil.address(9), None);
        assert_eq!(ChildRef::SelfRef { offset: 2 }.address(9), Some((9, 2)));
        assert_eq!(
            ChildRef::Explicit { csn: 4, offset: 1 }.address(9),
            Some((4, 1))
        );
    }

    #[test]
    fn stamp_rewrites_self_references_only() {
        let mut record = IntentionRecord::new(Some(1));
        record.nodes.push(NodeRecord::leaf(b"a".to_vec(), vec![]));
        let mut root = NodeRecord::leaf(b"b".to_vec(), vec![]);
        root.left = ChildRef::SelfRef { offset: 0 };
        root.right = ChildRef::Explicit { csn: 1, offset: 0 };
        record.nodes.push(root);

        record.stamp(5);

        assert_eq!(record.nodes[1].left, ChildRef::Explicit { csn: 5, offset: 0 });
        assert_eq!(record.nodes[1].right, ChildRef::Explicit { csn: 1, offset: 0 });
        assert_eq!(record.nodes[0].left, ChildRef::Nil);
    }

    #[test]
    fn root_is_last() {
        let mut record = IntentionRecord::new(None);
        assert_eq!(record.root_offset(), None);
        assert!(record.is_empty());
        record.nodes.push(NodeRecord::leaf(vec![1], vec![]));
        record.nodes.push(NodeRecord::leaf(vec![2], vec![]));
        assert_eq!(record.root_offset(), Some(1));
    }

    #[test]
    fn deletes_alone_are_not_empty() {
        let mut record = IntentionRecord::new(Some(0));
        record.deletes.push(ReadRecord {
            key: b"gone".to_vec(),
            version: Some(1),
        });
        assert!(!record.is_empty());
    }

    #[test]
    fn missing_source_version_rejected() {
        let mut record = IntentionRecord::new(None);
        let mut node = NodeRecord::leaf(vec![1], vec![]);
        node.subtree_ro_dependent = true;
        record.nodes.push(node);
        assert!(matches!(
            record.validate(),
            Err(CodecError::InvalidStructure { .. })
        ));
    }
}
