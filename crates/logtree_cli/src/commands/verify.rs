//! Verify command implementation.

use super::open_existing;
use crate::error::{CliError, CliResult};
use logtree_core::{Db, Decision, NodePtr};
use logtree_log::Log;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Positions checked.
    pub positions: u64,
    /// Positions that committed.
    pub committed: u64,
    /// Positions that conflicted.
    pub conflicts: u64,
    /// Positions that were filled.
    pub filled: u64,
    /// Tree nodes re-read through the cache.
    pub nodes_checked: usize,
    /// Problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> CliResult<()> {
    println!("Verifying log at {}", path.display());
    println!();

    let db = open_existing(path)?;
    let result = verify(&db)?;
    db.close()?;
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Log verification passed");
        Ok(())
    } else {
        println!("✗ Log verification failed");
        Err(CliError::VerificationFailed(result.errors.len()))
    }
}

fn verify(db: &Db) -> CliResult<VerifyResult> {
    let mut result = VerifyResult::default();

    let tail = db.log().tail()?;
    for position in 0..tail {
        result.positions += 1;
        match db.decision(position) {
            Some(Decision::Committed) => result.committed += 1,
            Some(Decision::Conflict) => result.conflicts += 1,
            Some(Decision::Filled) => result.filled += 1,
            Some(Decision::Corrupt(message)) => {
                result.errors.push(format!("position {position}: {message}"));
            }
            None => result
                .errors
                .push(format!("position {position}: not decided")),
        }
    }

    let snapshot = db.snapshot();
    if let Err(message) = snapshot.check_invariants() {
        result.errors.push(format!("tree: {message}"));
    }

    // Every reachable node must come back identical through the cache.
    let mut stack = vec![snapshot.root().clone()];
    while let Some(ptr) = stack.pop() {
        let Some(node) = ptr.node() else { continue };
        match db.cache().load(node.addr()) {
            Ok(loaded) if loaded.vn() == node.vn() && loaded.key() == node.key() => {}
            Ok(_) => result
                .errors
                .push(format!("node {} reloads differently", node.addr())),
            Err(e) => result.errors.push(format!("node {}: {e}", node.addr())),
        }
        result.nodes_checked += 1;
        for child in [node.left(), node.right()] {
            if !matches!(child, NodePtr::Nil) {
                stack.push(child.clone());
            }
        }
    }

    Ok(result)
}

fn print_result(result: &VerifyResult) {
    println!("  Positions checked: {}", result.positions);
    println!("  Committed: {}", result.committed);
    println!("  Conflicts: {}", result.conflicts);
    println!("  Filled: {}", result.filled);
    println!("  Tree nodes checked: {}", result.nodes_checked);

    if !result.errors.is_empty() {
        println!("  Errors:");
        for error in result.errors.iter().take(10) {
            println!("    - {error}");
        }
        if result.errors.len() > 10 {
            println!("    ... and {} more", result.errors.len() - 10);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logtree_core::Config;
    use logtree_log::FileLog;
    use tempfile::TempDir;

    fn write_log(path: &Path) {
        let db = Db::open_file(path, Config::default()).unwrap();
        for i in 0..10u8 {
            let mut txn = db.begin_transaction().unwrap();
            txn.put(vec![b'k', i], vec![i]).unwrap();
            assert!(txn.commit().unwrap());
        }
        db.close().unwrap();
    }

    #[test]
    fn clean_log_verifies() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tree.log");
        write_log(&path);

        let db = open_existing(&path).unwrap();
        let result = verify(&db).unwrap();
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.positions, 10);
        assert_eq!(result.committed, 10);
        assert_eq!(result.nodes_checked, 10);
    }

    #[test]
    fn corrupt_position_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tree.log");
        write_log(&path);
        {
            let log = FileLog::open(&path).unwrap();
            log.append(b"not an intention").unwrap();
        }

        let db = open_existing(&path).unwrap();
        let result = verify(&db).unwrap();
        assert_eq!(result.positions, 11);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("position 10"));
    }
}
