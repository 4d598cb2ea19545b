//! Benchmark utilities.

use logtree_core::{Config, Db};
use rand::Rng;

/// Generates random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Key `i` of a benchmark key space.
pub fn bench_key(i: usize) -> Vec<u8> {
    format!("key-{i:010}").into_bytes()
}

/// Generates `count` key/value pairs with values of `value_size` bytes.
pub fn generate_pairs(count: usize, value_size: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..count)
        .map(|i| (bench_key(i), random_data(value_size)))
        .collect()
}

/// Opens an in-memory database holding `pairs`, loaded in one transaction.
pub fn preloaded_db(pairs: &[(Vec<u8>, Vec<u8>)], config: Config) -> Db {
    let db = Db::open(std::sync::Arc::new(logtree_log::InMemoryLog::new()), config)
        .expect("Failed to open database");
    let mut txn = db.begin_transaction().expect("Failed to begin");
    for (key, value) in pairs {
        txn.put(key.clone(), value.clone()).expect("Failed to put");
    }
    assert!(txn.commit().expect("Failed to commit"));
    db
}
