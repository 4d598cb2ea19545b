//! Shared index from node addresses to nodes in memory.

use crate::error::{CoreError, CoreResult};
use crate::node::{Color, Node, NodeBuilder, NodePtr};
use crate::types::{NodeAddr, Version};
use logtree_codec::{ChildRef, Decode, IntentionRecord};
use logtree_log::{Log, LogEntry, LogError, Position};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    /// Nodes that can be read back from the log.
    nodes: HashMap<NodeAddr, Arc<Node>>,
    /// Insertion order of `nodes`, oldest first.
    order: VecDeque<NodeAddr>,
    /// Nodes with no log image of their own.
    pinned: HashMap<NodeAddr, Arc<Node>>,
    /// Running version before each cached position was numbered.
    bases: HashMap<Position, Version>,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Lookups answered from memory.
    pub hits: u64,
    /// Lookups that had to go to the log.
    pub misses: u64,
    /// Payloads read from the log.
    pub log_reads: u64,
    /// Entries dropped to respect the capacity.
    pub evictions: u64,
    /// Log-resident entries currently indexed.
    pub resident: u64,
    /// Pinned entries.
    pub pinned: u64,
}

/// Resolves `(csn, offset)` addresses to shared nodes.
///
/// Nodes are deserialized from the intention stored at `csn` the first time
/// they are needed. Every node of a position gets the version
/// `base + offset + 1`, where `base` is the running version recorded when the
/// position was first cached, so a node dropped from the index and read back
/// later is identical to the one it replaces.
///
/// Lookups and inserts take a short lock; log reads happen without it.
pub struct NodeCache {
    log: Arc<dyn Log>,
    capacity: Option<usize>,
    inner: RwLock<Inner>,
    hits: AtomicU64,
    misses: AtomicU64,
    log_reads: AtomicU64,
    evictions: AtomicU64,
}

impl std::fmt::Debug for NodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCache")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl NodeCache {
    /// Creates an empty cache over `log`.
    ///
    /// `capacity` bounds the number of log-resident nodes kept indexed;
    /// pinned nodes are not counted.
    #[must_use]
    pub fn new(log: Arc<dyn Log>, capacity: Option<usize>) -> Self {
        Self {
            log,
            capacity,
            inner: RwLock::new(Inner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            log_reads: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Binds an unresolved pointer to its node. Does nothing if the pointer
    /// is already resolved or nil.
    ///
    /// # Errors
    ///
    /// See [`NodeCache::load`].
    pub fn resolve(&self, ptr: &mut NodePtr) -> CoreResult<()> {
        if let NodePtr::Unresolved(addr) = *ptr {
            *ptr = NodePtr::Resolved(self.load(addr)?);
        }
        Ok(())
    }

    /// Returns the node at `addr`, reading it from the log if needed.
    ///
    /// # Errors
    ///
    /// - `Unresolvable` if no committed intention seen by this cache owns
    ///   the address
    /// - `CorruptPayload` if the payload at `addr.csn` is malformed
    /// - `Storage` if the log read fails
    pub fn load(&self, addr: NodeAddr) -> CoreResult<Arc<Node>> {
        if let Some(node) = self.lookup(addr) {
            return Ok(node);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let base = self.base(addr)?;
        let record = self.read_record(addr)?;
        let mut local = HashMap::new();
        self.materialize(&record, addr.csn, base, addr.offset, &mut local, true)
    }

    /// Numbers and indexes every node of the intention at `pos`.
    ///
    /// Node `i` gets version `running + i + 1`. Returns the root (the last
    /// node, or `Nil` for an empty node list) and the advanced counter.
    ///
    /// # Errors
    ///
    /// - `CorruptPayload` if the record is malformed
    /// - errors from resolving nodes of other positions
    pub fn cache_intention(
        &self,
        record: &IntentionRecord,
        pos: Position,
        running: Version,
    ) -> CoreResult<(NodePtr, Version)> {
        record
            .validate()
            .map_err(|e| CoreError::corrupt_payload(pos, e.to_string()))?;
        let count = u32::try_from(record.nodes.len())
            .map_err(|_| CoreError::corrupt_payload(pos, "too many nodes"))?;

        // Nothing of `pos` is indexed until every node has been built.
        let mut local = HashMap::new();
        let mut root = NodePtr::Nil;
        for index in 0..count {
            let node = self.materialize(record, pos, running, index, &mut local, false)?;
            root = NodePtr::Resolved(node);
        }

        self.inner.write().bases.insert(pos, running);
        for index in 0..count {
            if let Some(node) = local.remove(&index) {
                self.insert(node);
            }
        }

        tracing::trace!(position = pos, nodes = count, "cached intention");
        Ok((root, running + u64::from(count)))
    }

    /// Builds one node of the intention at `pos` from its wire fields,
    /// resolving both children.
    ///
    /// The node is returned but not indexed.
    ///
    /// # Errors
    ///
    /// - `CorruptPayload` if `index` is out of range or a child reference
    ///   points forward
    /// - errors from resolving the children
    pub fn deserialize_node(
        &self,
        record: &IntentionRecord,
        pos: Position,
        index: u32,
        vn: Version,
    ) -> CoreResult<Arc<Node>> {
        let base = vn.saturating_sub(u64::from(index) + 1);
        let mut local = HashMap::new();
        self.build(record, pos, index, vn, base, &mut local, false)
    }

    /// Indexes a node that has no log image of its own. Pinned nodes are
    /// never evicted.
    pub fn insert_pinned(&self, node: Arc<Node>) {
        self.inner.write().pinned.insert(node.addr(), node);
    }

    /// Drops everything indexed for `pos`, so that its addresses become
    /// unresolvable again. Used when a position is decided without committing.
    pub fn discard(&self, pos: Position) {
        let mut inner = self.inner.write();
        if inner.bases.remove(&pos).is_none() {
            return;
        }
        inner.nodes.retain(|addr, _| addr.csn != pos);
        inner.order.retain(|addr| addr.csn != pos);
        inner.pinned.retain(|addr, _| addr.csn != pos);
        tracing::trace!(position = pos, "discarded cached intention");
    }

    /// Returns true if `addr` is indexed.
    #[must_use]
    pub fn contains(&self, addr: NodeAddr) -> bool {
        let inner = self.inner.read();
        inner.nodes.contains_key(&addr) || inner.pinned.contains_key(&addr)
    }

    /// Returns the current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            log_reads: self.log_reads.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            resident: inner.nodes.len() as u64,
            pinned: inner.pinned.len() as u64,
        }
    }

    fn lookup(&self, addr: NodeAddr) -> Option<Arc<Node>> {
        let inner = self.inner.read();
        let node = inner
            .nodes
            .get(&addr)
            .or_else(|| inner.pinned.get(&addr))
            .cloned();
        if node.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        node
    }

    fn base(&self, addr: NodeAddr) -> CoreResult<Version> {
        self.inner
            .read()
            .bases
            .get(&addr.csn)
            .copied()
            .ok_or(CoreError::Unresolvable { addr })
    }

    fn read_record(&self, addr: NodeAddr) -> CoreResult<IntentionRecord> {
        self.log_reads.fetch_add(1, Ordering::Relaxed);
        let bytes = match self.log.read(addr.csn) {
            Ok(LogEntry::Data(bytes)) => bytes,
            Ok(LogEntry::Filled) | Err(LogError::NotWritten { .. }) => {
                return Err(CoreError::Unresolvable { addr })
            }
            Err(e) => return Err(e.into()),
        };
        IntentionRecord::decode(&bytes)
            .map_err(|e| CoreError::corrupt_payload(addr.csn, e.to_string()))
    }

    fn insert(&self, node: Arc<Node>) {
        let mut inner = self.inner.write();
        let addr = node.addr();
        if inner.nodes.insert(addr, node).is_none() {
            inner.order.push_back(addr);
        }
        let Some(capacity) = self.capacity else {
            return;
        };
        while inner.nodes.len() > capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.nodes.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns node `index` of the record at `pos`, building it (and
    /// whatever part of its subtree is not indexed) if needed.
    ///
    /// Built nodes are kept in `local`, and also indexed when `index_built`
    /// is set.
    fn materialize(
        &self,
        record: &IntentionRecord,
        pos: Position,
        base: Version,
        index: u32,
        local: &mut HashMap<u32, Arc<Node>>,
        index_built: bool,
    ) -> CoreResult<Arc<Node>> {
        if let Some(node) = local.get(&index) {
            return Ok(Arc::clone(node));
        }
        if let Some(node) = self.lookup(NodeAddr::new(pos, index)) {
            local.insert(index, Arc::clone(&node));
            return Ok(node);
        }
        let vn = base + u64::from(index) + 1;
        let node = self.build(record, pos, index, vn, base, local, index_built)?;
        if index_built {
            self.insert(Arc::clone(&node));
        }
        local.insert(index, Arc::clone(&node));
        Ok(node)
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        record: &IntentionRecord,
        pos: Position,
        index: u32,
        vn: Version,
        base: Version,
        local: &mut HashMap<u32, Arc<Node>>,
        index_built: bool,
    ) -> CoreResult<Arc<Node>> {
        let wire = record.nodes.get(index as usize).ok_or_else(|| {
            CoreError::corrupt_payload(
                pos,
                format!("no node {index} in an intention of {}", record.nodes.len()),
            )
        })?;

        let left = self.child(record, pos, base, index, wire.left, local, index_built)?;
        let right = self.child(record, pos, base, index, wire.right, local, index_built)?;

        let mut builder = NodeBuilder::new(wire.key.clone(), wire.value.clone(), pos, index)
            .with_color(Color::from_red(wire.red))
            .with_left(left)
            .with_right(right)
            .with_altered(wire.altered)
            .with_depends(wire.depends);
        builder.set_vn(vn)?;
        if let Some(ssv) = wire.ssv {
            builder.set_ssv(ssv)?;
        }
        builder.set_subtree_ro_dependent(wire.subtree_ro_dependent)?;
        builder
            .freeze()
            .map_err(|e| CoreError::corrupt_payload(pos, e.to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    fn child(
        &self,
        record: &IntentionRecord,
        pos: Position,
        base: Version,
        parent: u32,
        child: ChildRef,
        local: &mut HashMap<u32, Arc<Node>>,
        index_built: bool,
    ) -> CoreResult<NodePtr> {
        let Some((csn, offset)) = child.address(pos) else {
            return Ok(NodePtr::Nil);
        };
        if csn != pos {
            return self.load(NodeAddr::new(csn, offset)).map(NodePtr::Resolved);
        }
        if offset >= parent {
            return Err(CoreError::corrupt_payload(
                pos,
                format!("node {parent} refers forward to node {offset}"),
            ));
        }
        self.materialize(record, pos, base, offset, local, index_built)
            .map(NodePtr::Resolved)
    }
}
