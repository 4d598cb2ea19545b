//! CLI command implementations.

pub mod bench;
pub mod dump_log;
pub mod inspect;
pub mod verify;

use crate::error::{CliError, CliResult};
use logtree_core::{Config, Db};
use std::path::Path;

/// Opens and replays an existing log file.
fn open_existing(path: &Path) -> CliResult<Db> {
    if !path.exists() {
        return Err(CliError::NotFound(path.display().to_string()));
    }
    let config =
        Config::new().description(format!("opened by logtree {}", env!("CARGO_PKG_VERSION")));
    Ok(Db::open_file(path, config)?)
}

fn hex_prefix(bytes: &[u8], max: usize) -> String {
    let mut out: String = bytes.iter().take(max).map(|b| format!("{b:02x}")).collect();
    if bytes.len() > max {
        out.push_str("..");
    }
    out
}

/// Renders a key or value as text if it is printable, hex otherwise.
fn display_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if text.chars().all(|c| !c.is_control()) => text.to_string(),
        _ => format!("0x{}", hex_prefix(bytes, 32)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printable_bytes_stay_text() {
        assert_eq!(display_bytes(b"key-1"), "key-1");
        assert_eq!(display_bytes(&[0, 1, 0xff]), "0x0001ff");
        assert_eq!(hex_prefix(&[0xab; 4], 2), "abab..");
    }

    #[test]
    fn missing_log_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("absent.log");
        assert!(matches!(open_existing(&path), Err(CliError::NotFound(_))));
    }
}
