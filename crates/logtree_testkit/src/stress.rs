//! Stress tests for logtree.
//!
//! These drive many transactions from many threads at one database and
//! report how many committed and how many conflicted.

use logtree_core::{CoreResult, Db};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Transactions attempted, retries included.
    pub total_txns: usize,
    /// Transactions that committed.
    pub committed: usize,
    /// Transactions that conflicted.
    pub conflicts: usize,
    /// Total duration.
    pub duration: Duration,
    /// Commits per second.
    pub commits_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(committed: usize, conflicts: usize, duration: Duration) -> Self {
        let commits_per_second = if duration.as_secs_f64() > 0.0 {
            committed as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_txns: committed + conflicts,
            committed,
            conflicts,
            duration,
            commits_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Transactions: {}", self.total_txns);
        println!("Committed: {}", self.committed);
        println!("Conflicts: {}", self.conflicts);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} commits/sec", self.commits_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Worker threads.
    pub threads: usize,
    /// Transactions per thread.
    pub transactions: usize,
    /// Keys each transaction touches, or the size of the shared key space.
    pub keys: usize,
    /// Size of each value.
    pub value_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            transactions: 100,
            keys: 16,
            value_size: 32,
        }
    }
}

/// Counters shared by worker threads.
#[derive(Debug, Default)]
struct Tally {
    committed: AtomicUsize,
    conflicts: AtomicUsize,
}

impl Tally {
    fn record(&self, committed: bool) {
        if committed {
            self.committed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.conflicts.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn finish(&self, start: Instant) -> StressTestResult {
        StressTestResult::new(
            self.committed.load(Ordering::Relaxed),
            self.conflicts.load(Ordering::Relaxed),
            start.elapsed(),
        )
    }
}

fn run_threads<F>(config: &StressConfig, tally: &Arc<Tally>, work: F)
where
    F: Fn(usize, &Tally) -> CoreResult<()> + Send + Sync + 'static,
{
    let work = Arc::new(work);
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let work = Arc::clone(&work);
            let tally = Arc::clone(tally);
            thread::spawn(move || work(t, &tally))
        })
        .collect();

    for handle in handles {
        handle
            .join()
            .expect("Thread panicked")
            .expect("Transaction failed");
    }
}

/// Key `k` of thread `t`'s private range.
pub fn thread_key(t: usize, k: usize) -> Vec<u8> {
    format!("t{t:03}-k{k:05}").into_bytes()
}

/// Every thread writes its own keys; no transaction ever reads a key
/// another thread writes, so every one must commit.
pub fn stress_disjoint_writers(db: Arc<Db>, config: &StressConfig) -> StressTestResult {
    let tally = Arc::new(Tally::default());
    let value = vec![0xABu8; config.value_size];
    let per_thread = config.transactions;
    let keys = config.keys.max(1);

    let start = Instant::now();
    run_threads(config, &tally, move |t, tally| {
        for i in 0..per_thread {
            let mut txn = db.begin_transaction()?;
            txn.put(thread_key(t, i % keys), value.clone())?;
            tally.record(txn.commit()?);
        }
        Ok(())
    });
    tally.finish(start)
}

/// Every thread increments one shared counter, retrying on conflict.
///
/// Returns the result and the final counter value, which must equal
/// `threads * transactions`.
pub fn stress_contended_counter(db: Arc<Db>, config: &StressConfig) -> (StressTestResult, u64) {
    let tally = Arc::new(Tally::default());
    let per_thread = config.transactions;
    let reader = Arc::clone(&db);

    let start = Instant::now();
    run_threads(config, &tally, move |_, tally| {
        for _ in 0..per_thread {
            loop {
                let mut txn = db.begin_transaction()?;
                let current = txn.get(b"counter")?.map_or(0, |bytes| decode_counter(&bytes));
                txn.put(b"counter".to_vec(), (current + 1).to_be_bytes().to_vec())?;
                let committed = txn.commit()?;
                tally.record(committed);
                if committed {
                    break;
                }
            }
        }
        Ok(())
    });

    let count = reader
        .get(b"counter")
        .map_or(0, |bytes| decode_counter(&bytes));
    (tally.finish(start), count)
}

/// Every thread reads two keys and rewrites one of them, over a shared key
/// space, without retrying.
pub fn stress_mixed_transactions(db: Arc<Db>, config: &StressConfig) -> StressTestResult {
    let tally = Arc::new(Tally::default());
    let value = vec![0xCDu8; config.value_size];
    let per_thread = config.transactions;
    let keys = config.keys.max(1);

    let start = Instant::now();
    run_threads(config, &tally, move |t, tally| {
        for i in 0..per_thread {
            let a = (t * 7 + i * 3) % keys;
            let b = (t * 5 + i * 11) % keys;
            let mut txn = db.begin_transaction()?;
            txn.get(&thread_key(0, a))?;
            txn.get(&thread_key(0, b))?;
            if i % 4 == 3 {
                txn.delete(&thread_key(0, a))?;
            } else {
                txn.put(thread_key(0, a), value.clone())?;
            }
            tally.record(txn.commit()?);
        }
        Ok(())
    });
    tally.finish(start)
}

fn decode_counter(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let len = bytes.len().min(8);
    buf[8 - len..].copy_from_slice(&bytes[bytes.len() - len..]);
    u64::from_be_bytes(buf)
}
