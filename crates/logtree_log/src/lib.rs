//! # logtree log
//!
//! The append-only log that logtree commits through.
//!
//! The log is the only durable artifact of a logtree store and the only
//! ordering point between concurrent writers. Implementations are **opaque
//! payload stores**: they hand out strictly increasing positions and never
//! look inside what was appended.
//!
//! ## Contract
//!
//! - `append` allocates the next position and writes the payload there
//! - `read` returns what occupies a position: data, or a fill marker
//! - `fill` turns an unwritten position into a deliberate no-op
//! - `tail` is the next position `append` will hand out
//!
//! ## Available Logs
//!
//! - [`InMemoryLog`] - For tests and ephemeral stores
//! - [`FileLog`] - A single framed file with CRC-checked entries
//!
//! ## Example
//!
//! ```rust
//! use logtree_log::{InMemoryLog, Log, LogEntry};
//!
//! let log = InMemoryLog::new();
//! let pos = log.append(b"intention").unwrap();
//! assert_eq!(pos, 0);
//! assert_eq!(log.read(pos).unwrap(), LogEntry::Data(b"intention".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod frame;
mod log;
mod memory;

pub use error::{LogError, LogResult};
pub use file::FileLog;
pub use frame::compute_crc32;
pub use log::{Log, LogEntry, Position};
pub use memory::InMemoryLog;
