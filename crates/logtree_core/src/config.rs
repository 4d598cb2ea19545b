//! Database configuration.

use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of log-resident nodes kept in the node cache
    /// (`None` = unbounded).
    ///
    /// Only nodes that can be read back from the log count against it.
    /// Nodes produced by melds are pinned for the life of the handle, and the
    /// per-position version bases and decisions grow with the log.
    pub node_cache_capacity: Option<usize>,

    /// How long the log processor sleeps when it has caught up with the tail.
    pub poll_interval: Duration,

    /// How many times the processor re-reads an unwritten position below the
    /// tail before filling it.
    pub hole_retry_limit: u32,

    /// Whether a file log syncs after every append.
    pub sync_on_append: bool,

    /// Free-form lines attached to every snapshot.
    pub description: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_cache_capacity: None,
            poll_interval: Duration::from_millis(5),
            hole_retry_limit: 200,
            sync_on_append: false,
            description: Vec::new(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the log-resident part of the node cache. Pinned meld nodes,
    /// version bases and decisions are not covered.
    #[must_use]
    pub const fn node_cache_capacity(mut self, capacity: usize) -> Self {
        self.node_cache_capacity = Some(capacity);
        self
    }

    /// Sets the processor poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets how many polls a hole survives before it is filled.
    #[must_use]
    pub const fn hole_retry_limit(mut self, limit: u32) -> Self {
        self.hole_retry_limit = limit;
        self
    }

    /// Sets whether file logs sync on every append.
    #[must_use]
    pub const fn sync_on_append(mut self, value: bool) -> Self {
        self.sync_on_append = value;
        self
    }

    /// Appends a description line.
    #[must_use]
    pub fn description(mut self, line: impl Into<String>) -> Self {
        self.description.push(line.into());
        self
    }
}
