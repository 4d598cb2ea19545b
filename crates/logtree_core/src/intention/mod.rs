//! A transaction's change-set.
//!
//! An [`Intention`] starts as a view of a committed tree. Every node the
//! transaction touches is copied into the intention's arena; untouched
//! subtrees stay shared with the snapshot. Freezing the intention walks the
//! copied nodes in post-order and produces the record that is appended to
//! the log.

mod tree;

pub(crate) use tree::Origin;

use crate::error::{CoreError, CoreResult};
use crate::node::{Color, Node, NodeBuilder, NodePtr};
use crate::types::Version;
use logtree_codec::{ChildRef, IntentionRecord, NodeRecord, ReadRecord};
use logtree_log::Position;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Child link of an arena node.
#[derive(Debug, Clone)]
enum Link {
    Nil,
    /// A committed node, not modified by this intention.
    Shared(Arc<Node>),
    /// An arena node.
    Local(usize),
}

impl Link {
    fn from_ptr(ptr: &NodePtr) -> CoreResult<Self> {
        match ptr {
            NodePtr::Nil => Ok(Self::Nil),
            NodePtr::Resolved(node) => Ok(Self::Shared(Arc::clone(node))),
            NodePtr::Unresolved(addr) => Err(CoreError::Unresolvable { addr: *addr }),
        }
    }

    fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }
}

/// A node being built by this intention.
#[derive(Debug, Clone)]
struct Pending {
    key: Vec<u8>,
    value: Vec<u8>,
    color: Color,
    left: Link,
    right: Link,
    altered: bool,
    depends: bool,
    /// Content version of the committed node the key was copied from.
    ssv: Option<Version>,
}

impl Pending {
    fn copy_of(node: &Node) -> CoreResult<Self> {
        Ok(Self {
            key: node.key().to_vec(),
            value: node.value().to_vec(),
            color: node.color(),
            left: Link::from_ptr(node.left())?,
            right: Link::from_ptr(node.right())?,
            altered: false,
            depends: false,
            ssv: Some(node.nsv()),
        })
    }
}

/// Where a found key lives.
enum Entry<'a> {
    Local(&'a Pending),
    Shared(&'a Arc<Node>),
}

impl Entry<'_> {
    /// Committed content version the transaction observed for the key.
    fn observed(&self) -> Option<Version> {
        match self {
            Entry::Local(pending) => pending.ssv,
            Entry::Shared(node) => Some(node.nsv()),
        }
    }
}

/// Frozen nodes produced directly from an intention, without a log image.
#[derive(Debug)]
pub(crate) struct Materialized {
    pub root: NodePtr,
    pub nodes: Vec<Arc<Node>>,
    pub next_version: Version,
}

/// Copy-on-write change-set over one snapshot.
///
/// # Example
///
/// ```rust
/// use logtree_core::{Intention, NodePtr};
///
/// let mut intention = Intention::new(&NodePtr::Nil, None).unwrap();
/// intention.put(b"a".to_vec(), b"1".to_vec()).unwrap();
/// intention.put(b"b".to_vec(), b"2".to_vec()).unwrap();
/// assert_eq!(intention.get(b"a"), Some(b"1".to_vec()));
///
/// let record = intention.freeze().unwrap();
/// assert_eq!(record.nodes.len(), 2);
/// ```
#[derive(Debug)]
pub struct Intention {
    snapshot: Option<Position>,
    root: Link,
    arena: Vec<Pending>,
    reads: BTreeMap<Vec<u8>, Option<Version>>,
    deletes: BTreeMap<Vec<u8>, Version>,
    edits: usize,
}

impl Intention {
    /// Starts an intention over the tree rooted at `root`, which was
    /// committed at `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns `Unresolvable` if `root` is not resolved.
    pub fn new(root: &NodePtr, snapshot: Option<Position>) -> CoreResult<Self> {
        Ok(Self {
            snapshot,
            root: Link::from_ptr(root)?,
            arena: Vec::new(),
            reads: BTreeMap::new(),
            deletes: BTreeMap::new(),
            edits: 0,
        })
    }

    /// Position of the snapshot this intention builds on.
    #[must_use]
    pub fn snapshot(&self) -> Option<Position> {
        self.snapshot
    }

    /// Returns true if nothing was put or deleted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits == 0
    }

    /// Number of puts and deletes applied.
    #[must_use]
    pub fn edits(&self) -> usize {
        self.edits
    }

    /// Number of nodes copied or created so far, including ones already
    /// dropped by rebalancing.
    #[must_use]
    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }

    /// Reads `key` from the working tree.
    ///
    /// A value that comes from the snapshot (rather than from a put in this
    /// intention) is recorded in the read set together with its version; so
    /// is the absence of a key the snapshot does not hold.
    pub fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let (value, observed) = match self.find(key) {
            Some(Entry::Local(pending)) if pending.altered => return Some(pending.value.clone()),
            Some(entry) => {
                let value = match &entry {
                    Entry::Local(pending) => pending.value.clone(),
                    Entry::Shared(node) => node.value().to_vec(),
                };
                (Some(value), entry.observed())
            }
            None if self.deletes.contains_key(key) => return None,
            None => (None, None),
        };
        self.reads.entry(key.to_vec()).or_insert(observed);
        value
    }

    /// Freezes the intention into its wire record.
    ///
    /// Arena nodes reachable from the root are emitted in post-order, so
    /// every child precedes its parent and the root is last. Shared children
    /// become explicit references to their committed address.
    ///
    /// # Errors
    ///
    /// Fails only if the root cannot be copied.
    pub fn freeze(mut self) -> CoreResult<IntentionRecord> {
        if let Link::Shared(_) = self.root {
            let root = self.root.clone();
            self.root = Link::Local(self.own(&root)?);
        }

        let mut record = IntentionRecord::new(self.snapshot);
        if let Link::Local(root) = self.root {
            self.emit(root, &mut record.nodes);
        }
        record.reads = self
            .reads
            .iter()
            .map(|(key, version)| ReadRecord {
                key: key.clone(),
                version: *version,
            })
            .collect();
        record.deletes = self
            .deletes
            .iter()
            .map(|(key, version)| ReadRecord {
                key: key.clone(),
                version: Some(*version),
            })
            .collect();
        Ok(record)
    }

    /// Freezes the arena straight into shared nodes owned by `pos`.
    ///
    /// Node `k` of the post-order walk gets `field_index = first_index + k`
    /// and `vn = running + k + 1`.
    pub(crate) fn materialize(
        self,
        pos: Position,
        first_index: u32,
        running: Version,
    ) -> CoreResult<Materialized> {
        let mut nodes = Vec::new();
        let root = self.build_link(&self.root, pos, first_index, running, &mut nodes)?;
        let next_version = running + nodes.len() as u64;
        Ok(Materialized {
            root,
            nodes,
            next_version,
        })
    }

    fn find(&self, key: &[u8]) -> Option<Entry<'_>> {
        let mut link = &self.root;
        loop {
            match link {
                Link::Nil => return None,
                Link::Shared(node) => {
                    let mut cursor = Some(node);
                    while let Some(current) = cursor {
                        cursor = match key.cmp(current.key()) {
                            Ordering::Less => current.left().node(),
                            Ordering::Greater => current.right().node(),
                            Ordering::Equal => return Some(Entry::Shared(current)),
                        };
                    }
                    return None;
                }
                Link::Local(index) => {
                    let pending = &self.arena[*index];
                    link = match key.cmp(pending.key.as_slice()) {
                        Ordering::Less => &pending.left,
                        Ordering::Greater => &pending.right,
                        Ordering::Equal => return Some(Entry::Local(pending)),
                    };
                }
            }
        }
    }

    fn emit(&self, index: usize, nodes: &mut Vec<NodeRecord>) -> ChildRef {
        let pending = &self.arena[index];
        let left = self.emit_link(&pending.left, nodes);
        let right = self.emit_link(&pending.right, nodes);
        nodes.push(NodeRecord {
            key: pending.key.clone(),
            value: pending.value.clone(),
            red: pending.color.is_red(),
            altered: pending.altered,
            depends: pending.depends,
            ssv: pending.ssv,
            subtree_ro_dependent: !pending.altered,
            left,
            right,
        });
        ChildRef::SelfRef {
            offset: (nodes.len() - 1) as u32,
        }
    }

    fn emit_link(&self, link: &Link, nodes: &mut Vec<NodeRecord>) -> ChildRef {
        match link {
            Link::Nil => ChildRef::Nil,
            Link::Shared(node) => ChildRef::Explicit {
                csn: node.rid(),
                offset: node.field_index(),
            },
            Link::Local(index) => self.emit(*index, nodes),
        }
    }

    fn build_link(
        &self,
        link: &Link,
        pos: Position,
        first_index: u32,
        running: Version,
        nodes: &mut Vec<Arc<Node>>,
    ) -> CoreResult<NodePtr> {
        let index = match link {
            Link::Nil => return Ok(NodePtr::Nil),
            Link::Shared(node) => return Ok(NodePtr::Resolved(Arc::clone(node))),
            Link::Local(index) => *index,
        };
        let pending = &self.arena[index];
        let left = self.build_link(&pending.left, pos, first_index, running, nodes)?;
        let right = self.build_link(&pending.right, pos, first_index, running, nodes)?;

        let k = nodes.len() as u32;
        let mut builder = NodeBuilder::new(
            pending.key.clone(),
            pending.value.clone(),
            pos,
            first_index + k,
        )
        .with_color(pending.color)
        .with_left(left)
        .with_right(right)
        .with_altered(pending.altered)
        .with_depends(pending.depends);
        builder.set_vn(running + u64::from(k) + 1)?;
        if let Some(ssv) = pending.ssv {
            builder.set_ssv(ssv)?;
        }
        builder.set_subtree_ro_dependent(!pending.altered)?;

        let node = builder.freeze()?;
        nodes.push(Arc::clone(&node));
        Ok(NodePtr::Resolved(node))
    }
}
