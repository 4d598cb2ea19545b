//! Commit, conflict and meld behavior through the public `Db` API.

use logtree_core::{Config, CoreError, Db, Decision, TransactionState};
use logtree_log::{InMemoryLog, Log};
use std::sync::Arc;
use std::thread;

fn seed(db: &Db, pairs: &[(&[u8], &[u8])]) {
    let mut txn = db.begin_transaction().unwrap();
    for (key, value) in pairs {
        txn.put(key.to_vec(), value.to_vec()).unwrap();
    }
    assert!(txn.commit().unwrap());
}

fn contents(db: &Db) -> Vec<(Vec<u8>, Vec<u8>)> {
    db.snapshot()
        .iter()
        .map(|(k, v)| (k.to_vec(), v.to_vec()))
        .collect()
}

#[test]
fn conflicting_writer_retries_on_newer_snapshot() {
    let db = Db::open_in_memory().unwrap();

    let mut txn1 = db.begin_transaction().unwrap();
    txn1.put(b"a".to_vec(), b"1".to_vec()).unwrap();
    txn1.put(b"b".to_vec(), b"2".to_vec()).unwrap();
    assert!(txn1.commit().unwrap());
    assert_eq!(txn1.position(), Some(0));

    let first = db.snapshot();
    assert_eq!(first.position(), Some(0));

    let mut txn2 = db.begin_at(Arc::clone(&first)).unwrap();
    assert_eq!(txn2.get(b"a").unwrap(), Some(b"1".to_vec()));
    txn2.put(b"a".to_vec(), b"3".to_vec()).unwrap();
    assert!(txn2.commit().unwrap());
    assert_eq!(txn2.position(), Some(1));

    let mut txn3 = db.begin_at(first).unwrap();
    txn3.put(b"a".to_vec(), b"4".to_vec()).unwrap();
    assert!(!txn3.commit().unwrap());
    assert_eq!(txn3.state(), TransactionState::Aborted);
    assert_eq!(txn3.position(), Some(2));
    assert_eq!(db.decision(2), Some(Decision::Conflict));

    let latest = db.snapshot();
    assert_eq!(latest.position(), Some(1));
    let mut retry = db.begin_at(latest).unwrap();
    retry.put(b"a".to_vec(), b"5".to_vec()).unwrap();
    assert!(retry.commit().unwrap());
    assert_eq!(retry.position(), Some(3));

    assert_eq!(db.get(b"a"), Some(b"5".to_vec()));
    assert_eq!(db.get(b"b"), Some(b"2".to_vec()));
    assert!(db.snapshot().check_invariants().is_ok());
}

#[test]
fn disjoint_writers_both_commit() {
    let db = Db::open_in_memory().unwrap();
    seed(&db, &[(b"a", b"1")]);
    let base = db.snapshot();

    let mut left = db.begin_at(Arc::clone(&base)).unwrap();
    let mut right = db.begin_at(base).unwrap();
    left.put(b"x".to_vec(), b"left".to_vec()).unwrap();
    right.put(b"y".to_vec(), b"right".to_vec()).unwrap();

    assert!(left.commit().unwrap());
    assert!(right.commit().unwrap());

    assert_eq!(
        contents(&db),
        vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"x".to_vec(), b"left".to_vec()),
            (b"y".to_vec(), b"right".to_vec()),
        ]
    );
    assert!(db.snapshot().check_invariants().is_ok());
    assert_eq!(db.stats().melds, 1);
}

#[test]
fn cache_capacity_counts_only_log_resident_nodes() {
    let log = Arc::new(InMemoryLog::new());
    let db = Db::open(log, Config::new().node_cache_capacity(0)).unwrap();
    seed(&db, &[(b"a", b"1"), (b"b", b"2")]);
    let base = db.snapshot();

    let mut left = db.begin_at(Arc::clone(&base)).unwrap();
    let mut right = db.begin_at(base).unwrap();
    left.put(b"x".to_vec(), b"left".to_vec()).unwrap();
    right.put(b"y".to_vec(), b"right".to_vec()).unwrap();
    assert!(left.commit().unwrap());
    assert!(right.commit().unwrap());

    let cache = db.stats().cache;
    assert_eq!(cache.resident, 0);
    assert!(cache.pinned > 0);
    assert_eq!(db.get(b"y"), Some(b"right".to_vec()));
}

#[test]
fn disjoint_update_and_delete_both_commit() {
    let db = Db::open_in_memory().unwrap();
    seed(&db, &[(b"a", b"1"), (b"b", b"2"), (b"c", b"3")]);
    let base = db.snapshot();

    let mut update = db.begin_at(Arc::clone(&base)).unwrap();
    let mut delete = db.begin_at(base).unwrap();
    update.put(b"a".to_vec(), b"10".to_vec()).unwrap();
    assert!(delete.delete(b"c").unwrap());

    assert!(update.commit().unwrap());
    assert!(delete.commit().unwrap());

    assert_eq!(
        contents(&db),
        vec![
            (b"a".to_vec(), b"10".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
        ]
    );
    assert!(db.snapshot().check_invariants().is_ok());
}

#[test]
fn stale_read_aborts() {
    let db = Db::open_in_memory().unwrap();
    seed(&db, &[(b"a", b"1")]);
    let base = db.snapshot();

    let mut reader = db.begin_at(Arc::clone(&base)).unwrap();
    assert_eq!(reader.get(b"a").unwrap(), Some(b"1".to_vec()));
    reader.put(b"b".to_vec(), b"derived".to_vec()).unwrap();

    let mut writer = db.begin_at(base).unwrap();
    writer.put(b"a".to_vec(), b"2".to_vec()).unwrap();
    assert!(writer.commit().unwrap());

    assert!(!reader.commit().unwrap());
    assert_eq!(db.get(b"b"), None);
    assert_eq!(db.get(b"a"), Some(b"2".to_vec()));
}

#[test]
fn phantom_insert_aborts_reader_of_absent_key() {
    let db = Db::open_in_memory().unwrap();
    seed(&db, &[(b"a", b"1")]);
    let base = db.snapshot();

    let mut reader = db.begin_at(Arc::clone(&base)).unwrap();
    assert_eq!(reader.get(b"z").unwrap(), None);
    reader.put(b"b".to_vec(), b"saw no z".to_vec()).unwrap();

    let mut writer = db.begin_at(base).unwrap();
    writer.put(b"z".to_vec(), b"26".to_vec()).unwrap();
    assert!(writer.commit().unwrap());

    assert!(!reader.commit().unwrap());
}

#[test]
fn concurrent_deletes_of_one_key_conflict() {
    let db = Db::open_in_memory().unwrap();
    seed(&db, &[(b"a", b"1"), (b"b", b"2")]);
    let base = db.snapshot();

    let mut first = db.begin_at(Arc::clone(&base)).unwrap();
    let mut second = db.begin_at(base).unwrap();
    assert!(first.delete(b"a").unwrap());
    assert!(second.delete(b"a").unwrap());

    assert!(first.commit().unwrap());
    assert!(!second.commit().unwrap());
    assert_eq!(db.get(b"a"), None);
    assert_eq!(db.get(b"b"), Some(b"2".to_vec()));
}

#[test]
fn blind_inserts_of_one_new_key_keep_the_last() {
    let db = Db::open_in_memory().unwrap();
    let base = db.snapshot();

    let mut first = db.begin_at(Arc::clone(&base)).unwrap();
    let mut second = db.begin_at(base).unwrap();
    first.put(b"k".to_vec(), b"first".to_vec()).unwrap();
    second.put(b"k".to_vec(), b"second".to_vec()).unwrap();

    assert!(first.commit().unwrap());
    assert!(second.commit().unwrap());
    assert_eq!(db.get(b"k"), Some(b"second".to_vec()));
}

#[test]
fn transaction_sees_its_own_writes() {
    let db = Db::open_in_memory().unwrap();
    seed(&db, &[(b"a", b"1")]);

    let mut txn = db.begin_transaction().unwrap();
    txn.put(b"a".to_vec(), b"2".to_vec()).unwrap();
    txn.put(b"n".to_vec(), b"new".to_vec()).unwrap();
    assert_eq!(txn.get(b"a").unwrap(), Some(b"2".to_vec()));
    assert_eq!(txn.get(b"n").unwrap(), Some(b"new".to_vec()));
    assert!(txn.delete(b"a").unwrap());
    assert_eq!(txn.get(b"a").unwrap(), None);
    assert!(!txn.delete(b"missing").unwrap());

    // Nothing is visible before commit.
    assert_eq!(db.get(b"a"), Some(b"1".to_vec()));
    assert!(txn.commit().unwrap());
    assert_eq!(db.get(b"a"), None);
    assert_eq!(db.get(b"n"), Some(b"new".to_vec()));
}

#[test]
fn read_only_commit_skips_the_log() {
    let db = Db::open_in_memory().unwrap();
    seed(&db, &[(b"a", b"1")]);
    let tail = db.log().tail().unwrap();

    let mut txn = db.begin_transaction().unwrap();
    assert_eq!(txn.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert!(txn.commit().unwrap());
    assert_eq!(txn.position(), None);
    assert_eq!(txn.state(), TransactionState::Committed);
    assert_eq!(db.log().tail().unwrap(), tail);
    assert_eq!(db.stats().read_only_commits, 1);
}

#[test]
fn operations_after_commit_are_rejected() {
    let db = Db::open_in_memory().unwrap();
    let mut txn = db.begin_transaction().unwrap();
    txn.put(b"a".to_vec(), b"1".to_vec()).unwrap();
    assert!(txn.commit().unwrap());

    assert!(matches!(
        txn.put(b"a".to_vec(), b"2".to_vec()),
        Err(CoreError::ProtocolViolation { .. })
    ));
    assert!(matches!(
        txn.delete(b"a"),
        Err(CoreError::ProtocolViolation { .. })
    ));
    assert!(matches!(
        txn.get(b"a"),
        Err(CoreError::ProtocolViolation { .. })
    ));
    assert!(matches!(
        txn.commit(),
        Err(CoreError::ProtocolViolation { .. })
    ));
    assert!(matches!(
        txn.abort(),
        Err(CoreError::ProtocolViolation { .. })
    ));
    assert_eq!(db.get(b"a"), Some(b"1".to_vec()));
}

#[test]
fn aborted_transaction_leaves_no_trace() {
    let db = Db::open_in_memory().unwrap();
    let mut txn = db.begin_transaction().unwrap();
    txn.put(b"a".to_vec(), b"1".to_vec()).unwrap();
    txn.abort().unwrap();

    assert_eq!(txn.state(), TransactionState::Aborted);
    assert!(txn.commit().is_err());
    assert_eq!(db.log().tail().unwrap(), 0);
    assert!(db.snapshot().is_empty());
}

#[test]
fn old_snapshots_are_unaffected_by_later_commits() {
    let db = Db::open_in_memory().unwrap();
    seed(&db, &[(b"a", b"1"), (b"b", b"2")]);
    let old = db.snapshot();

    let mut txn = db.begin_transaction().unwrap();
    txn.put(b"a".to_vec(), b"changed".to_vec()).unwrap();
    txn.delete(b"b").unwrap();
    assert!(txn.commit().unwrap());

    assert_eq!(old.get(b"a"), Some(&b"1"[..]));
    assert_eq!(old.get(b"b"), Some(&b"2"[..]));
    assert_eq!(db.get(b"a"), Some(b"changed".to_vec()));
    assert_eq!(db.get(b"b"), None);
}

#[test]
fn contended_counter_counts_every_increment() {
    const THREADS: usize = 4;
    const INCREMENTS: usize = 25;

    let db = Arc::new(Db::open_in_memory().unwrap());
    seed(&db, &[(b"counter", b"0")]);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let mut aborts = 0;
                for _ in 0..INCREMENTS {
                    loop {
                        let mut txn = db.begin_transaction().unwrap();
                        let current = txn.get(b"counter").unwrap().unwrap();
                        let n: u64 = String::from_utf8(current).unwrap().parse().unwrap();
                        txn.put(b"counter".to_vec(), (n + 1).to_string().into_bytes())
                            .unwrap();
                        if txn.commit().unwrap() {
                            break;
                        }
                        aborts += 1;
                    }
                }
                aborts
            })
        })
        .collect();

    let aborts: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    let expected = (THREADS * INCREMENTS).to_string().into_bytes();
    assert_eq!(db.get(b"counter"), Some(expected));

    let stats = db.stats();
    assert_eq!(stats.transactions_committed as usize, THREADS * INCREMENTS + 1);
    assert_eq!(stats.transactions_aborted as usize, aborts);
}

#[test]
fn closed_database_rejects_new_work() {
    let db = Db::open_in_memory().unwrap();
    seed(&db, &[(b"a", b"1")]);
    db.close().unwrap();

    assert!(matches!(
        db.begin_transaction(),
        Err(CoreError::DatabaseClosed)
    ));
    assert_eq!(db.get(b"a"), Some(b"1".to_vec()));
}
