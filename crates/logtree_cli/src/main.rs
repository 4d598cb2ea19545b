//! logtree CLI
//!
//! Command-line tools for logtree stores.
//!
//! # Commands
//!
//! - `inspect` - Replay a log and show the committed state
//! - `verify` - Replay a log and check every position and the tree shape
//! - `dump-log` - Print what each log position holds
//! - `bench` - Drive concurrent transactions and report throughput
//! - `version` - Show version information

mod commands;
mod error;

use clap::{Parser, Subcommand};
use error::CliError;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// logtree command-line tools.
#[derive(Parser)]
#[command(name = "logtree")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the log file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a log and show the committed state
    Inspect {
        /// List every key and value
        #[arg(short, long)]
        entries: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replay a log and check it
    Verify,

    /// Print what each log position holds
    DumpLog {
        /// Maximum number of positions to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Start from this position
        #[arg(short, long, default_value = "0")]
        start: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Drive concurrent transactions and report throughput
    Bench {
        /// Worker threads
        #[arg(short, long, default_value = "4")]
        threads: usize,

        /// Transactions per thread
        #[arg(short = 'n', long, default_value = "1000")]
        transactions: usize,

        /// Size of the key space
        #[arg(short, long, default_value = "10000")]
        keys: u64,

        /// Reads per transaction
        #[arg(long, default_value = "2")]
        reads: usize,

        /// Writes per transaction
        #[arg(long, default_value = "2")]
        writes: usize,

        /// Value size in bytes
        #[arg(long, default_value = "64")]
        value_size: usize,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Bound on cached log-resident nodes
        #[arg(long)]
        cache_capacity: Option<usize>,

        /// Write per-transaction latencies to this CSV file
        #[arg(long)]
        latency_file: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { entries, format } => {
            let path = cli.path.ok_or(CliError::MissingPath("inspect"))?;
            commands::inspect::run(&path, entries, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or(CliError::MissingPath("verify"))?;
            commands::verify::run(&path)?;
        }
        Commands::DumpLog {
            limit,
            start,
            format,
        } => {
            let path = cli.path.ok_or(CliError::MissingPath("dump-log"))?;
            commands::dump_log::run(&path, limit, start, &format)?;
        }
        Commands::Bench {
            threads,
            transactions,
            keys,
            reads,
            writes,
            value_size,
            seed,
            cache_capacity,
            latency_file,
            format,
        } => {
            let options = commands::bench::BenchOptions {
                threads,
                transactions,
                keys,
                reads,
                writes,
                value_size,
                seed,
                cache_capacity,
                latency_file,
            };
            commands::bench::run(cli.path.as_deref(), &options, &format)?;
        }
        Commands::Version => {
            println!("logtree CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("wire format v{}", logtree_codec::FORMAT_VERSION);
        }
    }

    Ok(())
}
