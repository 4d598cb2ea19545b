//! Core type definitions.

use std::fmt;

/// Node version number.
///
/// Versions are handed out from a single running counter as intentions are
/// cached, so they totally order node revisions.
pub type Version = u64;

/// Where a serialized node lives: the position of the intention that wrote
/// it and its offset within that intention's node list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddr {
    /// Log position of the owning intention.
    pub csn: u64,
    /// Index within the intention.
    pub offset: u32,
}

impl NodeAddr {
    /// Creates a new address.
    #[must_use]
    pub const fn new(csn: u64, offset: u32) -> Self {
        Self { csn, offset }
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.csn, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_ordering() {
        assert!(NodeAddr::new(1, 9) < NodeAddr::new(2, 0));
        assert!(NodeAddr::new(2, 0) < NodeAddr::new(2, 1));
        assert_eq!(NodeAddr::new(7, 3).to_string(), "7:3");
    }
}
