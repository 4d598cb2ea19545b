//! Inspect command implementation.

use super::{display_bytes, open_existing};
use crate::error::CliResult;
use logtree_core::{Db, StatsSnapshot};
use logtree_log::Log;
use serde::Serialize;
use std::path::Path;

/// Committed state of a replayed log.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Log path.
    pub path: String,
    /// Log tail.
    pub tail: u64,
    /// Position of the last committed intention.
    pub position: Option<u64>,
    /// Running version counter.
    pub version: u64,
    /// Number of keys.
    pub entries: usize,
    /// Black height of the tree.
    pub black_height: Option<usize>,
    /// Positions decided during replay.
    pub positions_processed: u64,
    /// Positions melded onto a newer tree.
    pub melds: u64,
    /// Positions that could not be applied.
    pub corrupt_positions: u64,
    /// Keys and values (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<Vec<(String, String)>>,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_entries: bool, format: &str) -> CliResult<()> {
    let db = open_existing(path)?;
    let result = inspect(&db, path, show_entries)?;
    db.close()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }
    Ok(())
}

fn inspect(db: &Db, path: &Path, show_entries: bool) -> CliResult<InspectResult> {
    let snapshot = db.snapshot();
    let stats: StatsSnapshot = db.stats();
    let contents = show_entries.then(|| {
        snapshot
            .iter()
            .map(|(k, v)| (display_bytes(k), display_bytes(v)))
            .collect()
    });

    Ok(InspectResult {
        path: path.display().to_string(),
        tail: db.log().tail()?,
        position: snapshot.position(),
        version: snapshot.version(),
        entries: snapshot.len(),
        black_height: snapshot.check_invariants().ok(),
        positions_processed: stats.positions_processed,
        melds: stats.melds,
        corrupt_positions: stats.corrupt_positions,
        contents,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("logtree Log Inspection");
    println!("======================");
    println!();
    println!("Path: {}", result.path);
    println!("Tail: {}", result.tail);
    match result.position {
        Some(position) => println!("Last committed position: {position}"),
        None => println!("Last committed position: none"),
    }
    println!("Version counter: {}", result.version);
    println!("Entries: {}", result.entries);
    match result.black_height {
        Some(height) => println!("Black height: {height}"),
        None => println!("Black height: tree is not balanced"),
    }
    println!();
    println!("Replay");
    println!("------");
    println!("Positions decided: {}", result.positions_processed);
    println!("Melds: {}", result.melds);
    println!("Corrupt positions: {}", result.corrupt_positions);

    if let Some(ref contents) = result.contents {
        println!();
        println!("Contents");
        println!("--------");
        for (key, value) in contents {
            println!("  {key} = {value}");
        }
    }
}
