//! Left-leaning red-black insertion and deletion over the intention arena.
//!
//! Every node the algorithm changes (links, color or payload) is first
//! copied into the arena with [`Intention::own`]. Rotations only ever lift a
//! red child, so they exchange the two nodes' colors.

use super::{Intention, Link, Pending};
use crate::error::{CoreError, CoreResult};
use crate::node::Color;
use crate::types::Version;
use std::cmp::Ordering;

/// Provenance of a written value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Written by the transaction that owns the intention.
    Local,
    /// Carried over from an intention committed at the given content version.
    Committed(Version),
}

impl Pending {
    fn leaf(key: Vec<u8>, value: Vec<u8>, origin: Origin) -> Self {
        let (altered, ssv) = match origin {
            Origin::Local => (true, None),
            Origin::Committed(version) => (false, Some(version)),
        };
        Self {
            key,
            value,
            color: Color::Red,
            left: Link::Nil,
            right: Link::Nil,
            altered,
            depends: false,
            ssv,
        }
    }

    fn set_value(&mut self, value: Vec<u8>, origin: Origin) {
        self.value = value;
        match origin {
            Origin::Local => {
                self.altered = true;
                if self.ssv.is_some() {
                    self.depends = true;
                }
            }
            Origin::Committed(version) => {
                self.altered = false;
                self.depends = false;
                self.ssv = Some(version);
            }
        }
    }
}

impl Intention {
    /// Inserts or overwrites `key`.
    ///
    /// # Errors
    ///
    /// Returns `Unresolvable` if a committed node on the path has an
    /// unresolved child.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> CoreResult<()> {
        self.put_with(key, value, Origin::Local)
    }

    /// Removes `key`. Returns false, and changes nothing, if the key is not
    /// in the working tree.
    ///
    /// # Errors
    ///
    /// Returns `Unresolvable` if a committed node on the path has an
    /// unresolved child.
    pub fn delete(&mut self, key: &[u8]) -> CoreResult<bool> {
        let observed = match self.find(key) {
            None => return Ok(false),
            Some(entry) => entry.observed(),
        };
        if let Some(version) = observed {
            self.deletes.entry(key.to_vec()).or_insert(version);
        }

        let root = self.root.clone();
        let root = self.own(&root)?;
        if !self.is_red(&self.arena[root].left) && !self.is_red(&self.arena[root].right) {
            self.arena[root].color = Color::Red;
        }
        self.root = match self.remove(Link::Local(root), key)? {
            Link::Nil => Link::Nil,
            link => {
                let root = self.own(&link)?;
                self.arena[root].color = Color::Black;
                Link::Local(root)
            }
        };
        self.edits += 1;
        Ok(true)
    }

    pub(crate) fn put_with(
        &mut self,
        key: Vec<u8>,
        value: Vec<u8>,
        origin: Origin,
    ) -> CoreResult<()> {
        let root = self.root.clone();
        let root = self.insert(root, key, value, origin)?;
        self.arena[root].color = Color::Black;
        self.root = Link::Local(root);
        self.edits += 1;
        Ok(())
    }

    /// Copies a committed node into the arena, or returns the arena node.
    pub(super) fn own(&mut self, link: &Link) -> CoreResult<usize> {
        match link {
            Link::Local(index) => Ok(*index),
            Link::Shared(node) => {
                self.arena.push(Pending::copy_of(node)?);
                Ok(self.arena.len() - 1)
            }
            Link::Nil => Err(CoreError::protocol_violation(
                "the empty leaf cannot be copied",
            )),
        }
    }

    fn insert(
        &mut self,
        link: Link,
        key: Vec<u8>,
        value: Vec<u8>,
        origin: Origin,
    ) -> CoreResult<usize> {
        if link.is_nil() {
            self.arena.push(Pending::leaf(key, value, origin));
            return Ok(self.arena.len() - 1);
        }

        let h = self.own(&link)?;
        match key.as_slice().cmp(self.arena[h].key.as_slice()) {
            Ordering::Less => {
                let left = self.arena[h].left.clone();
                let child = self.insert(left, key, value, origin)?;
                self.arena[h].left = Link::Local(child);
            }
            Ordering::Greater => {
                let right = self.arena[h].right.clone();
                let child = self.insert(right, key, value, origin)?;
                self.arena[h].right = Link::Local(child);
            }
            Ordering::Equal => self.arena[h].set_value(value, origin),
        }
        self.balance(h)
    }

    /// Removes `key` from the non-empty subtree at `link`, which must hold it.
    fn remove(&mut self, link: Link, key: &[u8]) -> CoreResult<Link> {
        let mut h = self.own(&link)?;
        if key < self.arena[h].key.as_slice() {
            let left = self.arena[h].left.clone();
            if !self.is_red(&left) && !self.is_red(&self.left(&left)?) {
                h = self.move_red_left(h)?;
            }
            let left = self.arena[h].left.clone();
            let child = self.remove(left, key)?;
            self.arena[h].left = child;
        } else {
            if self.is_red(&self.arena[h].left) {
                h = self.rotate_right(h)?;
            }
            if key == self.arena[h].key.as_slice() && self.arena[h].right.is_nil() {
                return Ok(Link::Nil);
            }
            let right = self.arena[h].right.clone();
            if !self.is_red(&right) && !self.is_red(&self.left(&right)?) {
                h = self.move_red_right(h)?;
            }
            let right = self.arena[h].right.clone();
            let child = if key == self.arena[h].key.as_slice() {
                let successor = self.min(&right)?;
                self.steal_payload(h, &successor)?;
                self.remove_min(right)?
            } else {
                self.remove(right, key)?
            };
            self.arena[h].right = child;
        }
        Ok(Link::Local(self.balance(h)?))
    }

    fn remove_min(&mut self, link: Link) -> CoreResult<Link> {
        if self.left(&link)?.is_nil() {
            return Ok(Link::Nil);
        }
        let mut h = self.own(&link)?;
        let left = self.arena[h].left.clone();
        if !self.is_red(&left) && !self.is_red(&self.left(&left)?) {
            h = self.move_red_left(h)?;
        }
        let left = self.arena[h].left.clone();
        let child = self.remove_min(left)?;
        self.arena[h].left = child;
        Ok(Link::Local(self.balance(h)?))
    }

    fn min(&self, link: &Link) -> CoreResult<Link> {
        let mut current = link.clone();
        loop {
            let left = self.left(&current)?;
            if left.is_nil() {
                return Ok(current);
            }
            current = left;
        }
    }

    /// Moves key, value and their provenance from `src` into arena node `dst`.
    fn steal_payload(&mut self, dst: usize, src: &Link) -> CoreResult<()> {
        let (key, value, altered, depends, ssv) = match src {
            Link::Local(index) => {
                let src = &self.arena[*index];
                (src.key.clone(), src.value.clone(), src.altered, src.depends, src.ssv)
            }
            Link::Shared(node) => (
                node.key().to_vec(),
                node.value().to_vec(),
                false,
                false,
                Some(node.nsv()),
            ),
            Link::Nil => {
                return Err(CoreError::protocol_violation(
                    "the empty leaf has no payload",
                ))
            }
        };
        let dst = &mut self.arena[dst];
        dst.key = key;
        dst.value = value;
        dst.altered = altered;
        dst.depends = depends;
        dst.ssv = ssv;
        Ok(())
    }

    fn balance(&mut self, mut h: usize) -> CoreResult<usize> {
        if self.is_red(&self.arena[h].right) && !self.is_red(&self.arena[h].left) {
            h = self.rotate_left(h)?;
        }
        let left = self.arena[h].left.clone();
        if self.is_red(&left) && self.is_red(&self.left(&left)?) {
            h = self.rotate_right(h)?;
        }
        if self.is_red(&self.arena[h].left) && self.is_red(&self.arena[h].right) {
            self.flip_colors(h)?;
        }
        Ok(h)
    }

    fn move_red_left(&mut self, mut h: usize) -> CoreResult<usize> {
        self.flip_colors(h)?;
        let right = self.arena[h].right.clone();
        if self.is_red(&self.left(&right)?) {
            let r = self.own(&right)?;
            let r = self.rotate_right(r)?;
            self.arena[h].right = Link::Local(r);
            h = self.rotate_left(h)?;
            self.flip_colors(h)?;
        }
        Ok(h)
    }

    fn move_red_right(&mut self, mut h: usize) -> CoreResult<usize> {
        self.flip_colors(h)?;
        let left = self.arena[h].left.clone();
        if self.is_red(&self.left(&left)?) {
            h = self.rotate_right(h)?;
            self.flip_colors(h)?;
        }
        Ok(h)
    }

    fn rotate_left(&mut self, h: usize) -> CoreResult<usize> {
        let right = self.arena[h].right.clone();
        let x = self.own(&right)?;
        let inner = std::mem::replace(&mut self.arena[x].left, Link::Local(h));
        self.arena[h].right = inner;
        self.swap_color(h, x);
        Ok(x)
    }

    fn rotate_right(&mut self, h: usize) -> CoreResult<usize> {
        let left = self.arena[h].left.clone();
        let x = self.own(&left)?;
        let inner = std::mem::replace(&mut self.arena[x].right, Link::Local(h));
        self.arena[h].left = inner;
        self.swap_color(h, x);
        Ok(x)
    }

    fn swap_color(&mut self, a: usize, b: usize) {
        let color = self.arena[a].color;
        self.arena[a].color = self.arena[b].color;
        self.arena[b].color = color;
    }

    fn flip_colors(&mut self, h: usize) -> CoreResult<()> {
        self.arena[h].color = self.arena[h].color.flip();
        let left = self.arena[h].left.clone();
        if !left.is_nil() {
            let l = self.own(&left)?;
            self.arena[l].color = self.arena[l].color.flip();
            self.arena[h].left = Link::Local(l);
        }
        let right = self.arena[h].right.clone();
        if !right.is_nil() {
            let r = self.own(&right)?;
            self.arena[r].color = self.arena[r].color.flip();
            self.arena[h].right = Link::Local(r);
        }
        Ok(())
    }

    fn is_red(&self, link: &Link) -> bool {
        match link {
            Link::Nil => false,
            Link::Shared(node) => node.is_red(),
            Link::Local(index) => self.arena[*index].color.is_red(),
        }
    }

    fn left(&self, link: &Link) -> CoreResult<Link> {
        match link {
            Link::Nil => Ok(Link::Nil),
            Link::Shared(node) => Link::from_ptr(node.left()),
            Link::Local(index) => Ok(self.arena[*index].left.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodePtr;
    use std::collections::BTreeMap;

    /// Walks the working tree, checking red-black rules and key order.
    /// Returns the black height.
    fn check(
        intention: &Intention,
        link: &Link,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> usize {
        let (key, red, left, right) = match link {
            Link::Nil => return 0,
            Link::Shared(node) => (
                node.key().to_vec(),
                node.is_red(),
                Link::from_ptr(node.left()).unwrap(),
                Link::from_ptr(node.right()).unwrap(),
            ),
            Link::Local(index) => {
                let p = &intention.arena[*index];
                (p.key.clone(), p.color.is_red(), p.left.clone(), p.right.clone())
            }
        };
        if let Some(lower) = lower {
            assert!(key.as_slice() > lower, "key order violated");
        }
        if let Some(upper) = upper {
            assert!(key.as_slice() < upper, "key order violated");
        }
        if red {
            assert!(
                !intention.is_red(&left) && !intention.is_red(&right),
                "red node with red child"
            );
        }
        let lh = check(intention, &left, lower, Some(&key));
        let rh = check(intention, &right, Some(&key), upper);
        assert_eq!(lh, rh, "black height differs");
        lh + usize::from(!red)
    }

    fn check_tree(intention: &Intention) {
        assert!(!intention.is_red(&intention.root), "red root");
        check(intention, &intention.root, None, None);
    }

    fn contents(
        intention: &mut Intention,
        keys: impl Iterator<Item = Vec<u8>>,
    ) -> BTreeMap<Vec<u8>, Vec<u8>> {
        keys.filter_map(|k| intention.get(&k).map(|v| (k, v))).collect()
    }

    fn key(i: u32) -> Vec<u8> {
        format!("{i:04}").into_bytes()
    }

    #[test]
    fn ascending_inserts_stay_balanced() {
        let mut intention = Intention::new(&NodePtr::Nil, None).unwrap();
        for i in 0..200 {
            intention.put(key(i), key(i)).unwrap();
            check_tree(&intention);
        }
        let record = intention.freeze().unwrap();
        assert_eq!(record.nodes.len(), 200);
    }

    #[test]
    fn repeated_put_updates_in_place() {
        let mut intention = Intention::new(&NodePtr::Nil, None).unwrap();
        intention.put(b"k".to_vec(), b"1".to_vec()).unwrap();
        let len = intention.arena_len();
        intention.put(b"k".to_vec(), b"2".to_vec()).unwrap();
        assert_eq!(intention.arena_len(), len);
        assert_eq!(intention.get(b"k"), Some(b"2".to_vec()));
        assert_eq!(intention.edits(), 2);
    }

    #[test]
    fn deletes_match_a_model() {
        let mut intention = Intention::new(&NodePtr::Nil, None).unwrap();
        let mut model = BTreeMap::new();
        for i in (0..120).map(|i| (i * 37) % 120) {
            intention.put(key(i), key(i)).unwrap();
            model.insert(key(i), key(i));
        }
        for i in (0..120).filter(|i| i % 3 != 0) {
            assert!(intention.delete(&key(i)).unwrap());
            model.remove(&key(i));
            check_tree(&intention);
        }
        assert!(!intention.delete(&key(1)).unwrap());

        let got = contents(&mut intention, (0..120).map(key));
        assert_eq!(got, model);
    }

    #[test]
    fn delete_everything() {
        let mut intention = Intention::new(&NodePtr::Nil, None).unwrap();
        for i in 0..10 {
            intention.put(key(i), vec![]).unwrap();
        }
        for i in (0..10).rev() {
            assert!(intention.delete(&key(i)).unwrap());
        }
        assert!(matches!(intention.root, Link::Nil));
        assert!(intention.freeze().unwrap().nodes.is_empty());
    }

    #[test]
    fn new_keys_do_not_depend() {
        let mut intention = Intention::new(&NodePtr::Nil, None).unwrap();
        intention.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        let record = intention.freeze().unwrap();
        let node = &record.nodes[0];
        assert!(node.altered);
        assert!(!node.depends);
        assert_eq!(node.ssv, None);
        assert!(!node.subtree_ro_dependent);
    }

    #[test]
    fn committed_origin_keeps_version() {
        let mut intention = Intention::new(&NodePtr::Nil, Some(3)).unwrap();
        intention
            .put_with(b"a".to_vec(), b"1".to_vec(), Origin::Committed(17))
            .unwrap();
        let m = intention.materialize(5, 2, 30).unwrap();
        let root = m.root.node().unwrap();
        assert_eq!(root.nsv(), 17);
        assert_eq!(root.vn(), 31);
        assert_eq!(root.field_index(), 2);
        assert_eq!(root.rid(), 5);
        assert!(!root.altered());
        assert_eq!(m.next_version, 31);
    }
}
