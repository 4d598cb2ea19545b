//! Database counters.

use crate::cache::CacheStats;
use std::sync::atomic::{AtomicU64, Ordering};

/// Transaction and log-processing counters.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct DbStats {
    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_aborted: AtomicU64,
    read_only_commits: AtomicU64,
    positions_processed: AtomicU64,
    melds: AtomicU64,
    holes_filled: AtomicU64,
    corrupt_positions: AtomicU64,
    bytes_appended: AtomicU64,
}

impl DbStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_transaction_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abort(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read_only_commit(&self) {
        self.read_only_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_position(&self) {
        self.positions_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_meld(&self) {
        self.melds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fill(&self) {
        self.holes_filled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_corrupt(&self) {
        self.corrupt_positions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_append(&self, bytes: u64) {
        self.bytes_appended.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters, including the cache's.
    pub fn snapshot(&self, cache: CacheStats) -> StatsSnapshot {
        StatsSnapshot {
            transactions_started: self.transactions_started.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_aborted: self.transactions_aborted.load(Ordering::Relaxed),
            read_only_commits: self.read_only_commits.load(Ordering::Relaxed),
            positions_processed: self.positions_processed.load(Ordering::Relaxed),
            melds: self.melds.load(Ordering::Relaxed),
            holes_filled: self.holes_filled.load(Ordering::Relaxed),
            corrupt_positions: self.corrupt_positions.load(Ordering::Relaxed),
            bytes_appended: self.bytes_appended.load(Ordering::Relaxed),
            cache,
        }
    }
}

/// A point-in-time snapshot of database statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Transactions begun.
    pub transactions_started: u64,
    /// Commits this instance appended that validated.
    pub transactions_committed: u64,
    /// Commits this instance appended that conflicted.
    pub transactions_aborted: u64,
    /// Commits with nothing to append.
    pub read_only_commits: u64,
    /// Log positions decided by the processor.
    pub positions_processed: u64,
    /// Intentions merged onto a newer tree than their snapshot.
    pub melds: u64,
    /// Holes the processor filled.
    pub holes_filled: u64,
    /// Positions whose payload could not be applied.
    pub corrupt_positions: u64,
    /// Payload bytes appended by this instance.
    pub bytes_appended: u64,
    /// Node cache counters.
    pub cache: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = DbStats::new();
        stats.record_transaction_start();
        stats.record_transaction_start();
        stats.record_commit();
        stats.record_abort();
        stats.record_append(12);
        stats.record_append(30);

        let snap = stats.snapshot(CacheStats::default());
        assert_eq!(snap.transactions_started, 2);
        assert_eq!(snap.transactions_committed, 1);
        assert_eq!(snap.transactions_aborted, 1);
        assert_eq!(snap.bytes_appended, 42);
        assert_eq!(snap.melds, 0);
    }
}
