//! Bench command implementation.
//!
//! Each worker thread runs a fixed number of transactions. A transaction
//! reads `reads` random keys, writes `writes` random keys and commits once,
//! without retrying. Latency is split into begin, run and commit phases.

use crate::error::CliResult;
use logtree_core::{Config, Db};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Workload parameters.
#[derive(Debug, Clone)]
pub struct BenchOptions {
    /// Worker threads.
    pub threads: usize,
    /// Transactions per thread.
    pub transactions: usize,
    /// Size of the key space.
    pub keys: u64,
    /// Reads per transaction.
    pub reads: usize,
    /// Writes per transaction.
    pub writes: usize,
    /// Value size in bytes.
    pub value_size: usize,
    /// Random seed; thread `i` uses `seed + i`.
    pub seed: u64,
    /// Bound on cached log-resident nodes.
    pub cache_capacity: Option<usize>,
    /// CSV file for per-transaction latencies.
    pub latency_file: Option<PathBuf>,
}

/// Latency of one transaction, in nanoseconds.
#[derive(Debug, Clone, Copy)]
struct TxnStat {
    begin: u64,
    run: u64,
    commit: u64,
    committed: bool,
}

/// Summary of one phase's latencies, in microseconds.
#[derive(Debug, Serialize)]
pub struct LatencySummary {
    /// Mean.
    pub mean_us: f64,
    /// Median.
    pub p50_us: f64,
    /// 99th percentile.
    pub p99_us: f64,
    /// Maximum.
    pub max_us: f64,
}

/// Benchmark result.
#[derive(Debug, Serialize)]
pub struct BenchReport {
    /// Transactions attempted.
    pub transactions: usize,
    /// Transactions that committed.
    pub committed: usize,
    /// Transactions that conflicted.
    pub aborted: usize,
    /// Wall-clock duration in seconds.
    pub seconds: f64,
    /// Committed transactions per second.
    pub commits_per_second: f64,
    /// Begin phase.
    pub begin: LatencySummary,
    /// Read/write phase.
    pub run: LatencySummary,
    /// Commit phase.
    pub commit: LatencySummary,
    /// Intentions melded onto a newer tree.
    pub melds: u64,
    /// Payload bytes appended.
    pub bytes_appended: u64,
    /// Keys in the final tree.
    pub final_entries: usize,
}

/// Runs the bench command against a file log at `path`, or in memory.
pub fn run(path: Option<&Path>, options: &BenchOptions, format: &str) -> CliResult<()> {
    let mut config = Config::new().description("logtree bench");
    if let Some(capacity) = options.cache_capacity {
        config = config.node_cache_capacity(capacity);
    }
    let db = match path {
        Some(path) => Db::open_file(path, config)?,
        None => Db::open(Arc::new(logtree_log::InMemoryLog::new()), config)?,
    };
    let db = Arc::new(db);

    tracing::info!(?options, "starting bench");
    let (stats, elapsed) = drive(&db, options);
    if let Some(ref file) = options.latency_file {
        write_latencies(file, &stats)?;
    }
    let report = summarize(&db, &stats, elapsed);
    db.close()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }
    Ok(())
}

fn drive(db: &Arc<Db>, options: &BenchOptions) -> (Vec<TxnStat>, Duration) {
    let start = Instant::now();
    let handles: Vec<_> = (0..options.threads)
        .map(|index| {
            let db = Arc::clone(db);
            let options = options.clone();
            thread::spawn(move || worker(&db, &options, options.seed + index as u64))
        })
        .collect();

    let mut stats = Vec::with_capacity(options.threads * options.transactions);
    for handle in handles {
        match handle.join() {
            Ok(Ok(worker_stats)) => stats.extend(worker_stats),
            Ok(Err(e)) => tracing::error!(error = %e, "bench worker failed"),
            Err(_) => tracing::error!("bench worker panicked"),
        }
    }
    (stats, start.elapsed())
}

fn worker(db: &Db, options: &BenchOptions, seed: u64) -> CliResult<Vec<TxnStat>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut stats = Vec::with_capacity(options.transactions);
    let keys = options.keys.max(1);

    for _ in 0..options.transactions {
        let begin_start = Instant::now();
        let mut txn = db.begin_transaction()?;

        let run_start = Instant::now();
        for _ in 0..options.reads {
            txn.get(&bench_key(rng.gen_range(0..keys)))?;
        }
        for _ in 0..options.writes {
            let key = bench_key(rng.gen_range(0..keys));
            let value: Vec<u8> = (0..options.value_size).map(|_| rng.gen()).collect();
            txn.put(key, value)?;
        }

        let commit_start = Instant::now();
        let committed = txn.commit()?;
        let end = Instant::now();

        stats.push(TxnStat {
            begin: nanos(run_start - begin_start),
            run: nanos(commit_start - run_start),
            commit: nanos(end - commit_start),
            committed,
        });
    }
    Ok(stats)
}

fn bench_key(n: u64) -> Vec<u8> {
    format!("key-{n:010}").into_bytes()
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

fn write_latencies(path: &Path, stats: &[TxnStat]) -> CliResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "ns_begin_lat,ns_run_lat,ns_commit_lat,committed")?;
    for stat in stats {
        writeln!(
            out,
            "{},{},{},{}",
            stat.begin, stat.run, stat.commit, stat.committed
        )?;
    }
    out.flush()?;
    Ok(())
}

fn summarize(db: &Db, stats: &[TxnStat], elapsed: Duration) -> BenchReport {
    let committed = stats.iter().filter(|s| s.committed).count();
    let seconds = elapsed.as_secs_f64();
    let db_stats = db.stats();
    BenchReport {
        transactions: stats.len(),
        committed,
        aborted: stats.len() - committed,
        seconds,
        commits_per_second: if seconds > 0.0 {
            committed as f64 / seconds
        } else {
            0.0
        },
        begin: latency(stats.iter().map(|s| s.begin)),
        run: latency(stats.iter().map(|s| s.run)),
        commit: latency(stats.iter().map(|s| s.commit)),
        melds: db_stats.melds,
        bytes_appended: db_stats.bytes_appended,
        final_entries: db.snapshot().len(),
    }
}

fn latency(samples: impl Iterator<Item = u64>) -> LatencySummary {
    let mut samples: Vec<u64> = samples.collect();
    if samples.is_empty() {
        return LatencySummary {
            mean_us: 0.0,
            p50_us: 0.0,
            p99_us: 0.0,
            max_us: 0.0,
        };
    }
    samples.sort_unstable();
    let us = |ns: u64| ns as f64 / 1_000.0;
    let percentile = |p: f64| {
        let rank = ((samples.len() - 1) as f64 * p).round() as usize;
        us(samples[rank])
    };
    let sum: u128 = samples.iter().map(|&s| u128::from(s)).sum();
    LatencySummary {
        mean_us: sum as f64 / samples.len() as f64 / 1_000.0,
        p50_us: percentile(0.50),
        p99_us: percentile(0.99),
        max_us: us(samples[samples.len() - 1]),
    }
}

fn print_text_output(report: &BenchReport) {
    println!("logtree Bench");
    println!("=============");
    println!();
    println!("Transactions: {}", report.transactions);
    println!("Committed: {}", report.committed);
    println!("Aborted: {}", report.aborted);
    println!("Duration: {:.3}s", report.seconds);
    println!("Throughput: {:.2} commits/sec", report.commits_per_second);
    println!("Melds: {}", report.melds);
    println!("Bytes appended: {}", report.bytes_appended);
    println!("Final entries: {}", report.final_entries);
    println!();
    println!(
        "{:<8} {:>10} {:>10} {:>10} {:>10}",
        "phase", "mean us", "p50 us", "p99 us", "max us"
    );
    for (name, summary) in [
        ("begin", &report.begin),
        ("run", &report.run),
        ("commit", &report.commit),
    ] {
        println!(
            "{:<8} {:>10.1} {:>10.1} {:>10.1} {:>10.1}",
            name, summary.mean_us, summary.p50_us, summary.p99_us, summary.max_us
        );
    }
}
