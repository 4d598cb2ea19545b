//! CLI errors.

use logtree_core::CoreError;
use logtree_log::LogError;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The command needs `--path`.
    #[error("log path required for {0}")]
    MissingPath(&'static str),

    /// No log file at the given path.
    #[error("no log found at {0}")]
    NotFound(String),

    /// Replaying or committing failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Reading the log failed.
    #[error(transparent)]
    Log(#[from] LogError),

    /// Writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output failed.
    #[error("cannot write JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The log or the tree failed a check.
    #[error("verification failed with {0} problem(s)")]
    VerificationFailed(usize),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
