//! Dump-log command implementation.

use super::{display_bytes, open_existing};
use crate::error::CliResult;
use logtree_codec::{Decode, IntentionRecord};
use logtree_core::{Db, Decision};
use logtree_log::{Log, LogEntry, LogError};
use serde::Serialize;
use std::path::Path;

/// One log position, as printed.
#[derive(Debug, Serialize)]
pub struct PositionInfo {
    /// Log position.
    pub position: u64,
    /// What occupies the position (data, filled, hole).
    pub kind: &'static str,
    /// Payload size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<usize>,
    /// Snapshot the intention was built on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<u64>,
    /// Serialized nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<usize>,
    /// Keys written by the transaction.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub writes: Vec<String>,
    /// Keys read by the transaction.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reads: Vec<String>,
    /// Keys deleted by the transaction.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deletes: Vec<String>,
    /// What replay decided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
}

impl PositionInfo {
    fn new(position: u64, kind: &'static str) -> Self {
        Self {
            position,
            kind,
            bytes: None,
            snapshot: None,
            nodes: None,
            writes: Vec::new(),
            reads: Vec::new(),
            deletes: Vec::new(),
            decision: None,
        }
    }
}

/// Runs the dump-log command.
pub fn run(path: &Path, limit: Option<usize>, start: u64, format: &str) -> CliResult<()> {
    let db = open_existing(path)?;
    let positions = read_positions(&db, start, limit)?;
    db.close()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&positions)?);
        }
        _ => {
            print_text_output(&positions);
        }
    }
    Ok(())
}

fn read_positions(db: &Db, start: u64, limit: Option<usize>) -> CliResult<Vec<PositionInfo>> {
    let tail = db.log().tail()?;
    let max = limit.unwrap_or(usize::MAX);
    let mut positions = Vec::new();

    for position in start..tail {
        if positions.len() >= max {
            break;
        }
        let mut info = match db.log().read(position) {
            Ok(LogEntry::Data(bytes)) => describe(position, &bytes),
            Ok(LogEntry::Filled) => PositionInfo::new(position, "filled"),
            Err(LogError::NotWritten { .. }) => PositionInfo::new(position, "hole"),
            Err(e) => return Err(e.into()),
        };
        info.decision = db.decision(position).map(|decision| match decision {
            Decision::Committed => "committed".to_string(),
            Decision::Conflict => "conflict".to_string(),
            Decision::Filled => "filled".to_string(),
            Decision::Corrupt(message) => format!("corrupt: {message}"),
        });
        positions.push(info);
    }
    Ok(positions)
}

fn describe(position: u64, bytes: &[u8]) -> PositionInfo {
    let mut info = PositionInfo::new(position, "data");
    info.bytes = Some(bytes.len());
    if let Ok(record) = IntentionRecord::decode(bytes) {
        info.snapshot = record.snapshot;
        info.nodes = Some(record.nodes.len());
        info.writes = record
            .nodes
            .iter()
            .filter(|node| node.altered)
            .map(|node| display_bytes(&node.key))
            .collect();
        info.reads = record.reads.iter().map(|r| display_bytes(&r.key)).collect();
        info.deletes = record.deletes.iter().map(|d| display_bytes(&d.key)).collect();
    }
    info
}

fn print_text_output(positions: &[PositionInfo]) {
    println!("Log Positions ({} total)", positions.len());
    println!("=====================");
    println!();

    for info in positions {
        print!("[{:08}] {:6}", info.position, info.kind);
        if let Some(bytes) = info.bytes {
            print!(" {bytes} bytes");
        }
        if let Some(snapshot) = info.snapshot {
            print!(" snapshot={snapshot}");
        }
        if let Some(nodes) = info.nodes {
            print!(" nodes={nodes}");
        }
        if !info.writes.is_empty() {
            print!(" writes=[{}]", info.writes.join(","));
        }
        if !info.reads.is_empty() {
            print!(" reads=[{}]", info.reads.join(","));
        }
        if !info.deletes.is_empty() {
            print!(" deletes=[{}]", info.deletes.join(","));
        }
        if let Some(ref decision) = info.decision {
            print!(" -> {decision}");
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logtree_core::Config;
    use tempfile::TempDir;

    #[test]
    fn positions_are_described_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tree.log");
        {
            let db = Db::open_file(&path, Config::default()).unwrap();
            let mut txn = db.begin_transaction().unwrap();
            txn.put(b"a".to_vec(), b"1".to_vec()).unwrap();
            assert!(txn.commit().unwrap());

            let mut txn = db.begin_transaction().unwrap();
            assert_eq!(txn.get(b"a").unwrap(), Some(b"1".to_vec()));
            txn.delete(b"a").unwrap();
            txn.put(b"b".to_vec(), b"2".to_vec()).unwrap();
            assert!(txn.commit().unwrap());
            db.close().unwrap();
        }

        let db = open_existing(&path).unwrap();
        let positions = read_positions(&db, 0, None).unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].writes, vec!["a".to_string()]);
        assert_eq!(positions[0].snapshot, None);
        assert_eq!(positions[1].snapshot, Some(0));
        assert_eq!(positions[1].reads, vec!["a".to_string()]);
        assert_eq!(positions[1].deletes, vec!["a".to_string()]);
        assert_eq!(positions[1].writes, vec!["b".to_string()]);
        assert_eq!(positions[1].decision.as_deref(), Some("committed"));

        let limited = read_positions(&db, 1, Some(5)).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].position, 1);
    }
}
