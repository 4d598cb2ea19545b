//! Transaction state.

use crate::error::{CoreError, CoreResult};

/// Lifecycle of a transaction.
///
/// ```text
/// Building --commit--> Committing --+--> Committed
///     |                             +--> Aborted
///     +--abort------------------------> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Operations are being recorded.
    Building,
    /// The intention has been handed to the commit pipeline.
    Committing,
    /// The intention validated.
    Committed,
    /// The intention conflicted, failed, or was abandoned.
    Aborted,
}

impl TransactionState {
    /// Returns true while operations may still be recorded.
    #[must_use]
    pub fn is_building(self) -> bool {
        self == Self::Building
    }

    /// Returns true once the outcome is known.
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }

    /// Fails unless the transaction is still building.
    pub(crate) fn ensure_building(self, operation: &str) -> CoreResult<()> {
        if self.is_building() {
            Ok(())
        } else {
            Err(CoreError::protocol_violation(format!(
                "{operation} on a transaction that is {self:?}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_building_accepts_operations() {
        assert!(TransactionState::Building.ensure_building("put").is_ok());
        for state in [
            TransactionState::Committing,
            TransactionState::Committed,
            TransactionState::Aborted,
        ] {
            assert!(matches!(
                state.ensure_building("put"),
                Err(CoreError::ProtocolViolation { .. })
            ));
        }
        assert!(TransactionState::Aborted.is_finished());
        assert!(!TransactionState::Committing.is_finished());
    }
}
