//! Tree nodes.
//!
//! A node exists in two forms:
//!
//! - [`NodeBuilder`] while its write-once fields are being assigned
//! - [`Node`] once [`NodeBuilder::freeze`] has consumed the builder
//!
//! A frozen node is shared as `Arc<Node>` by every snapshot and transaction
//! that reaches it and has no mutators at all:
//!
//! ```compile_fail
//! use logtree_core::NodeBuilder;
//!
//! let mut builder = NodeBuilder::new(b"k".to_vec(), b"v".to_vec(), 0, 0);
//! builder.set_vn(1).unwrap();
//! builder.set_subtree_ro_dependent(false).unwrap();
//! let node = builder.freeze().unwrap();
//! node.set_vn(2).unwrap();
//! ```
//!
//! Freezing consumes the builder, so it cannot be touched afterwards either:
//!
//! ```compile_fail
//! use logtree_core::NodeBuilder;
//!
//! let mut builder = NodeBuilder::new(b"k".to_vec(), b"v".to_vec(), 0, 0);
//! builder.set_vn(1).unwrap();
//! builder.set_subtree_ro_dependent(false).unwrap();
//! let _node = builder.freeze().unwrap();
//! builder.set_ssv(4).unwrap();
//! ```

mod ptr;

pub use ptr::NodePtr;

use crate::error::{CoreError, CoreResult};
use crate::types::{NodeAddr, Version};
use std::sync::Arc;

/// Node color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    /// Red.
    Red,
    /// Black.
    Black,
}

impl Color {
    /// Returns true for red.
    #[must_use]
    pub fn is_red(self) -> bool {
        self == Self::Red
    }

    /// Returns the opposite color.
    #[must_use]
    pub fn flip(self) -> Self {
        match self {
            Self::Red => Self::Black,
            Self::Black => Self::Red,
        }
    }

    pub(crate) fn from_red(red: bool) -> Self {
        if red {
            Self::Red
        } else {
            Self::Black
        }
    }
}

/// A committed tree node.
#[derive(Debug)]
pub struct Node {
    key: Vec<u8>,
    value: Vec<u8>,
    color: Color,
    left: NodePtr,
    right: NodePtr,
    rid: u64,
    field_index: u32,
    altered: bool,
    depends: bool,
    vn: Version,
    ssv: Option<Version>,
    subtree_ro_dependent: bool,
}

impl Node {
    /// Key bytes.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Value bytes.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Node color.
    #[must_use]
    pub fn color(&self) -> Color {
        self.color
    }

    /// Returns true if the node is red.
    #[must_use]
    pub fn is_red(&self) -> bool {
        self.color.is_red()
    }

    /// Left child. Never [`NodePtr::Unresolved`].
    #[must_use]
    pub fn left(&self) -> &NodePtr {
        &self.left
    }

    /// Right child. Never [`NodePtr::Unresolved`].
    #[must_use]
    pub fn right(&self) -> &NodePtr {
        &self.right
    }

    /// Log position of the intention that produced this node.
    #[must_use]
    pub fn rid(&self) -> u64 {
        self.rid
    }

    /// Offset of this node within its intention.
    #[must_use]
    pub fn field_index(&self) -> u32 {
        self.field_index
    }

    /// Address other intentions use to refer to this node.
    #[must_use]
    pub fn addr(&self) -> NodeAddr {
        NodeAddr::new(self.rid, self.field_index)
    }

    /// Whether the producing intention wrote this node's value.
    #[must_use]
    pub fn altered(&self) -> bool {
        self.altered
    }

    /// Whether the producing intention derived this node from a prior read.
    #[must_use]
    pub fn depends(&self) -> bool {
        self.depends
    }

    /// Version number.
    #[must_use]
    pub fn vn(&self) -> Version {
        self.vn
    }

    /// Source structure version, if the node was copied from a committed one.
    #[must_use]
    pub fn ssv(&self) -> Option<Version> {
        self.ssv
    }

    /// Whether [`Node::nsv`] reports `ssv` instead of `vn`.
    #[must_use]
    pub fn subtree_ro_dependent(&self) -> bool {
        self.subtree_ro_dependent
    }

    /// Normalized version: the version at which this node's content was
    /// produced.
    #[must_use]
    pub fn nsv(&self) -> Version {
        match (self.subtree_ro_dependent, self.ssv) {
            (true, Some(ssv)) => ssv,
            _ => self.vn,
        }
    }
}

/// A node under construction.
///
/// `vn`, `ssv` and `subtree_ro_dependent` may each be assigned once.
#[derive(Debug)]
pub struct NodeBuilder {
    key: Vec<u8>,
    value: Vec<u8>,
    color: Color,
    left: NodePtr,
    right: NodePtr,
    rid: u64,
    field_index: u32,
    altered: bool,
    depends: bool,
    vn: Option<Version>,
    ssv: Option<Version>,
    subtree_ro_dependent: Option<bool>,
}

impl NodeBuilder {
    /// Starts a red leaf at `(rid, field_index)`.
    #[must_use]
    pub fn new(key: Vec<u8>, value: Vec<u8>, rid: u64, field_index: u32) -> Self {
        Self {
            key,
            value,
            color: Color::Red,
            left: NodePtr::Nil,
            right: NodePtr::Nil,
            rid,
            field_index,
            altered: false,
            depends: false,
            vn: None,
            ssv: None,
            subtree_ro_dependent: None,
        }
    }

    /// Sets the color.
    #[must_use]
    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    /// Sets the left child.
    #[must_use]
    pub fn with_left(mut self, left: NodePtr) -> Self {
        self.left = left;
        self
    }

    /// Sets the right child.
    #[must_use]
    pub fn with_right(mut self, right: NodePtr) -> Self {
        self.right = right;
        self
    }

    /// Sets the altered flag.
    #[must_use]
    pub fn with_altered(mut self, altered: bool) -> Self {
        self.altered = altered;
        self
    }

    /// Sets the depends flag.
    #[must_use]
    pub fn with_depends(mut self, depends: bool) -> Self {
        self.depends = depends;
        self
    }

    /// Assigns the version number.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` if it was already assigned.
    pub fn set_vn(&mut self, vn: Version) -> CoreResult<()> {
        set_once(&mut self.vn, vn, "vn")
    }

    /// Assigns the source structure version.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` if it was already assigned.
    pub fn set_ssv(&mut self, ssv: Version) -> CoreResult<()> {
        set_once(&mut self.ssv, ssv, "ssv")
    }

    /// Selects whether the node reports `ssv` or `vn` as its version.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` if it was already assigned.
    pub fn set_subtree_ro_dependent(&mut self, value: bool) -> CoreResult<()> {
        set_once(
            &mut self.subtree_ro_dependent,
            value,
            "subtree_ro_dependent",
        )
    }

    /// Returns the version number.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` if it has not been assigned.
    pub fn vn(&self) -> CoreResult<Version> {
        self.vn
            .ok_or_else(|| CoreError::protocol_violation("vn read before it was set"))
    }

    /// Returns the source structure version, if assigned.
    #[must_use]
    pub fn ssv(&self) -> Option<Version> {
        self.ssv
    }

    /// Returns the `subtree_ro_dependent` flag.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` if it has not been assigned.
    pub fn subtree_ro_dependent(&self) -> CoreResult<bool> {
        self.subtree_ro_dependent.ok_or_else(|| {
            CoreError::protocol_violation("subtree_ro_dependent read before it was set")
        })
    }

    /// Converts the builder into an immutable shared node.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` if `vn` or `subtree_ro_dependent` is
    /// unassigned, if the node reports `ssv` without carrying one, or if a
    /// child is still unresolved.
    pub fn freeze(self) -> CoreResult<Arc<Node>> {
        let vn = self.vn()?;
        let subtree_ro_dependent = self.subtree_ro_dependent()?;
        if subtree_ro_dependent && self.ssv.is_none() {
            return Err(CoreError::protocol_violation(
                "node reports a source version it does not carry",
            ));
        }
        for child in [&self.left, &self.right] {
            if let NodePtr::Unresolved(addr) = child {
                return Err(CoreError::protocol_violation(format!(
                    "child {addr} must be resolved before freezing"
                )));
            }
        }

        Ok(Arc::new(Node {
            key: self.key,
            value: self.value,
            color: self.color,
            left: self.left,
            right: self.right,
            rid: self.rid,
            field_index: self.field_index,
            altered: self.altered,
            depends: self.depends,
            vn,
            ssv: self.ssv,
            subtree_ro_dependent,
        }))
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &str) -> CoreResult<()> {
    if slot.is_some() {
        return Err(CoreError::protocol_violation(format!(
            "{field} assigned twice"
        )));
    }
    *slot = Some(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(key: &[u8]) -> NodeBuilder {
        NodeBuilder::new(key.to_vec(), b"v".to_vec(), 3, 1)
    }

    fn frozen(key: &[u8], vn: Version) -> Arc<Node> {
        let mut b = builder(key).with_color(Color::Black);
        b.set_vn(vn).unwrap();
        b.set_subtree_ro_dependent(false).unwrap();
        b.freeze().unwrap()
    }

    #[test]
    fn write_once_fields() {
        let mut b = builder(b"k");
        b.set_vn(1).unwrap();
        assert!(matches!(
            b.set_vn(2),
            Err(CoreError::ProtocolViolation { .. })
        ));
        b.set_ssv(5).unwrap();
        assert!(b.set_ssv(5).is_err());
        b.set_subtree_ro_dependent(true).unwrap();
        assert!(b.set_subtree_ro_dependent(true).is_err());
        assert_eq!(b.vn().unwrap(), 1);
    }

    #[test]
    fn read_before_set_fails() {
        let b = builder(b"k");
        assert!(matches!(b.vn(), Err(CoreError::ProtocolViolation { .. })));
        assert!(b.subtree_ro_dependent().is_err());
        assert!(matches!(
            b.freeze(),
            Err(CoreError::ProtocolViolation { .. })
        ));
    }

    #[test]
    fn freeze_requires_ssv_when_reported() {
        let mut b = builder(b"k");
        b.set_vn(1).unwrap();
        b.set_subtree_ro_dependent(true).unwrap();
        assert!(matches!(
            b.freeze(),
            Err(CoreError::ProtocolViolation { .. })
        ));
    }

    #[test]
    fn freeze_rejects_unresolved_children() {
        let mut b = builder(b"k").with_left(NodePtr::Unresolved(NodeAddr::new(0, 0)));
        b.set_vn(1).unwrap();
        b.set_subtree_ro_dependent(false).unwrap();
        assert!(b.freeze().is_err());
    }

    #[test]
    fn nsv_selects_version() {
        let own = frozen(b"a", 9);
        assert_eq!(own.nsv(), 9);

        let mut b = builder(b"b").with_left(NodePtr::from(own));
        b.set_vn(10).unwrap();
        b.set_ssv(4).unwrap();
        b.set_subtree_ro_dependent(true).unwrap();
        let copied = b.freeze().unwrap();
        assert_eq!(copied.vn(), 10);
        assert_eq!(copied.nsv(), 4);
        assert_eq!(copied.addr(), NodeAddr::new(3, 1));
        assert!(copied.left().is_resolved());
    }

    #[test]
    fn color_flip() {
        assert_eq!(Color::Red.flip(), Color::Black);
        assert!(Color::from_red(true).is_red());
        assert!(!Color::from_red(false).is_red());
    }
}
