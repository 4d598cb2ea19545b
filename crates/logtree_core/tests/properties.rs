//! Tree-level properties: last-write-wins, balance, round-trips through the
//! node cache, and resolution.

use logtree_core::{Config, Db, Intention, NodeAddr, NodePtr};
use logtree_log::{InMemoryLog, Log, LogEntry, LogResult, Position};
use logtree_testkit::{
    pooled_key_strategy, value_strategy, write_op_strategy, Model, Op, PropTestConfig,
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const KEYS: u8 = 24;

fn key(k: u8) -> Vec<u8> {
    format!("k{k:02}").into_bytes()
}

fn collect(ptr: &NodePtr, out: &mut Vec<(Vec<u8>, Vec<u8>)>) {
    if let Some(node) = ptr.node() {
        collect(node.left(), out);
        out.push((node.key().to_vec(), node.value().to_vec()));
        collect(node.right(), out);
    }
}

fn pairs(model: &Model) -> Vec<(Vec<u8>, Vec<u8>)> {
    model.iter().map(|(k, v)| (k.to_vec(), v.to_vec())).collect()
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn sequential_transactions_are_last_write_wins(
        ops in prop::collection::vec(write_op_strategy(KEYS), 1..60)
    ) {
        let db = Db::open_in_memory().unwrap();
        let mut model = Model::new();

        for op in &ops {
            prop_assert!(model.execute(&db, std::slice::from_ref(op)));
            prop_assert!(db.snapshot().check_invariants().is_ok());
        }

        prop_assert_eq!(model.verify(&db.snapshot()), Ok(()));
    }

    #[test]
    fn batched_transactions_stay_balanced(
        batches in prop::collection::vec(
            prop::collection::vec(write_op_strategy(KEYS), 1..20),
            1..8,
        )
    ) {
        let db = Db::open_in_memory().unwrap();
        let mut model = Model::new();

        for batch in &batches {
            prop_assert!(model.execute(&db, batch));
            prop_assert!(db.snapshot().check_invariants().is_ok());
        }

        prop_assert_eq!(model.verify(&db.snapshot()), Ok(()));
    }

    #[test]
    fn frozen_intention_round_trips_through_the_cache(
        seed in prop::collection::vec((pooled_key_strategy(KEYS), value_strategy()), 0..24),
        ops in prop::collection::vec(write_op_strategy(KEYS), 1..30)
    ) {
        let db = Db::open_in_memory().unwrap();
        let mut model = Model::new();
        if !seed.is_empty() {
            let writes: Vec<_> = seed.into_iter().map(|(k, v)| Op::Put(k, v)).collect();
            prop_assert!(model.execute(&db, &writes));
        }

        let snapshot = db.snapshot();
        let mut intention = Intention::new(snapshot.root(), snapshot.position()).unwrap();
        for op in &ops {
            match op {
                Op::Put(k, v) => intention.put(k.clone(), v.clone()).unwrap(),
                Op::Delete(k) => {
                    intention.delete(k).unwrap();
                }
                Op::Get(_) => {}
            }
        }
        model.apply(&ops);
        let record = intention.freeze().unwrap();

        // Decoded at a position past anything the database has written.
        let (root, _) = db
            .cache()
            .cache_intention(&record, 1_000, snapshot.version())
            .unwrap();
        let mut actual = Vec::new();
        collect(&root, &mut actual);
        prop_assert_eq!(actual, pairs(&model));
    }
}

/// Counts payload reads that return data.
#[derive(Debug, Default)]
struct CountingLog {
    inner: InMemoryLog,
    data_reads: AtomicU64,
}

impl Log for CountingLog {
    fn append(&self, payload: &[u8]) -> LogResult<Position> {
        self.inner.append(payload)
    }

    fn read(&self, position: Position) -> LogResult<LogEntry> {
        let entry = self.inner.read(position)?;
        if entry.data().is_some() {
            self.data_reads.fetch_add(1, Ordering::SeqCst);
        }
        Ok(entry)
    }

    fn fill(&self, position: Position) -> LogResult<()> {
        self.inner.fill(position)
    }

    fn tail(&self) -> LogResult<Position> {
        self.inner.tail()
    }
}

#[test]
fn resolving_twice_reads_the_log_once() {
    let log = Arc::new(CountingLog::default());
    let db = Db::open(log.clone(), Config::new().node_cache_capacity(0)).unwrap();

    let mut txn = db.begin_transaction().unwrap();
    for k in 0..8 {
        txn.put(key(k), vec![k]).unwrap();
    }
    assert!(txn.commit().unwrap());

    let root = db.snapshot().root().addr().unwrap();
    let before = log.data_reads.load(Ordering::SeqCst);

    let mut ptr = NodePtr::from(root);
    db.cache().resolve(&mut ptr).unwrap();
    assert!(ptr.is_resolved());
    let after_first = log.data_reads.load(Ordering::SeqCst);
    assert_eq!(after_first, before + 1);

    db.cache().resolve(&mut ptr).unwrap();
    assert_eq!(log.data_reads.load(Ordering::SeqCst), after_first);
    assert_eq!(ptr.node().unwrap().key(), db.snapshot().root().node().unwrap().key());
}

#[test]
fn evicted_nodes_resolve_to_identical_versions() {
    let db = Db::open(
        Arc::new(InMemoryLog::new()),
        Config::new().node_cache_capacity(2),
    )
    .unwrap();
    for k in 0..20u8 {
        let mut txn = db.begin_transaction().unwrap();
        txn.put(key(k), vec![k]).unwrap();
        assert!(txn.commit().unwrap());
    }

    let snapshot = db.snapshot();
    let mut stack = vec![snapshot.root().clone()];
    let mut checked = 0;
    while let Some(ptr) = stack.pop() {
        let Some(node) = ptr.node() else { continue };
        let loaded = db.cache().load(node.addr()).unwrap();
        assert_eq!(loaded.key(), node.key());
        assert_eq!(loaded.value(), node.value());
        assert_eq!(loaded.vn(), node.vn());
        assert_eq!(loaded.nsv(), node.nsv());
        assert_eq!(loaded.color(), node.color());
        stack.push(node.left().clone());
        stack.push(node.right().clone());
        checked += 1;
    }
    assert_eq!(checked, 20);

    let stats = db.cache().stats();
    assert!(stats.evictions > 0);
    assert!(stats.log_reads > 0);
    assert!(stats.resident <= 2);
}

#[test]
fn unknown_address_is_unresolvable() {
    let db = Db::open_in_memory().unwrap();
    let mut ptr = NodePtr::from(NodeAddr::new(7, 0));
    assert!(db.cache().resolve(&mut ptr).is_err());
    assert!(!ptr.is_resolved());
}
