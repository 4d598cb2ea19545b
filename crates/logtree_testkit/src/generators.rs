//! Property-based test generators using proptest.
//!
//! Keys are drawn from a small alphabet so that generated transactions
//! overlap often enough to exercise updates, deletes and conflicts.

use proptest::prelude::*;

/// One transactional operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Write `value` under `key`.
    Put(Vec<u8>, Vec<u8>),
    /// Remove `key`.
    Delete(Vec<u8>),
    /// Read `key`.
    Get(Vec<u8>),
}

impl Op {
    /// The key this operation touches.
    pub fn key(&self) -> &[u8] {
        match self {
            Op::Put(key, _) | Op::Delete(key) | Op::Get(key) => key,
        }
    }

    /// Returns true if the operation changes the tree.
    pub fn is_write(&self) -> bool {
        !matches!(self, Op::Get(_))
    }
}

/// Strategy for keys over a small alphabet.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(b'a'..=b'h', 1..4)
}

/// Strategy for keys drawn from a fixed pool of `count` keys.
pub fn pooled_key_strategy(count: u8) -> impl Strategy<Value = Vec<u8>> {
    (0..count.max(1)).prop_map(|i| vec![b'k', i])
}

/// Strategy for values (arbitrary bytes, possibly empty).
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// Strategy for a single operation, weighted towards writes.
pub fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        5 => (key_strategy(), value_strategy()).prop_map(|(k, v)| Op::Put(k, v)),
        2 => key_strategy().prop_map(Op::Delete),
        3 => key_strategy().prop_map(Op::Get),
    ]
}

/// Strategy for puts and deletes over a pool of `count` keys.
pub fn write_op_strategy(count: u8) -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (pooled_key_strategy(count), value_strategy()).prop_map(|(k, v)| Op::Put(k, v)),
        1 => pooled_key_strategy(count).prop_map(Op::Delete),
    ]
}

/// Strategy for the operations of one transaction.
pub fn transaction_strategy(max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 1..=max_ops.max(1))
}

/// Strategy for a history of transactions, applied in order.
pub fn history_strategy(
    max_transactions: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<Vec<Op>>> {
    prop::collection::vec(transaction_strategy(max_ops), 1..=max_transactions.max(1))
}

/// Strategy for distinct sorted keys, for bulk loads.
pub fn distinct_keys_strategy(max: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::btree_set(prop::collection::vec(any::<u8>(), 1..16), 0..max)
        .prop_map(|keys| keys.into_iter().collect())
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to generate.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest's config.
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn keys_stay_in_alphabet(key in key_strategy()) {
            prop_assert!(!key.is_empty() && key.len() < 4);
            prop_assert!(key.iter().all(|b| (b'a'..=b'h').contains(b)));
        }

        #[test]
        fn pooled_keys_are_bounded(key in pooled_key_strategy(5)) {
            prop_assert_eq!(key[0], b'k');
            prop_assert!(key[1] < 5);
        }

        #[test]
        fn write_ops_use_the_pool(op in write_op_strategy(3)) {
            prop_assert!(op.is_write());
            prop_assert!(op.key()[1] < 3);
        }

        #[test]
        fn distinct_keys_are_sorted(keys in distinct_keys_strategy(32)) {
            prop_assert!(keys.windows(2).all(|w| w[0] < w[1]));
        }

        #[test]
        fn transactions_are_never_empty(ops in transaction_strategy(6)) {
            prop_assert!(!ops.is_empty() && ops.len() <= 6);
        }
    }

    #[test]
    fn op_accessors() {
        assert_eq!(Op::Put(b"a".to_vec(), vec![]).key(), b"a");
        assert!(Op::Delete(b"a".to_vec()).is_write());
        assert!(!Op::Get(b"a".to_vec()).is_write());
    }

    #[test]
    fn config_presets() {
        assert!(PropTestConfig::quick().cases < PropTestConfig::default().cases);
        assert!(PropTestConfig::thorough().cases > PropTestConfig::default().cases);
        assert_eq!(PropTestConfig::quick().to_proptest_config().cases, 32);
    }
}
