//! Property tests for the value chain.
//!
//! The oracle is an ordinary map replayed over the same layering sequence:
//! for every key, the nearest (most recently layered) value must win, and
//! layering onto a chain must never change what earlier scopes observe.

mod common;

use common::init_test_logging;
use proptest::prelude::*;
use reqscope::{Context, Key};
use std::collections::HashMap;

const KEY_SLOTS: usize = 4;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn nearest_ancestor_wins_over_any_layering(
        ops in proptest::collection::vec((0usize..KEY_SLOTS, any::<u32>()), 0..32)
    ) {
        init_test_logging();
        let keys: Vec<Key<u32>> = (0..KEY_SLOTS).map(|_| Key::new()).collect();

        let mut scope = Context::background();
        let mut oracle: HashMap<usize, u32> = HashMap::new();
        for &(slot, value) in &ops {
            scope = scope.with_value(keys[slot], value);
            oracle.insert(slot, value);
        }

        for (slot, key) in keys.iter().enumerate() {
            let got = scope.value(*key);
            let want = oracle.get(&slot);
            prop_assert_eq!(got.as_deref(), want);
        }
    }

    #[test]
    fn layering_never_mutates_existing_chains(
        prefix in proptest::collection::vec((0usize..KEY_SLOTS, any::<u32>()), 1..16),
        suffix in proptest::collection::vec((0usize..KEY_SLOTS, any::<u32>()), 1..16),
    ) {
        init_test_logging();
        let keys: Vec<Key<u32>> = (0..KEY_SLOTS).map(|_| Key::new()).collect();

        let mut scope = Context::background();
        let mut oracle: HashMap<usize, u32> = HashMap::new();
        for &(slot, value) in &prefix {
            scope = scope.with_value(keys[slot], value);
            oracle.insert(slot, value);
        }
        let snapshot = scope.clone();
        let snapshot_oracle = oracle.clone();

        // Layer more values; the snapshot must be unaffected.
        for &(slot, value) in &suffix {
            scope = scope.with_value(keys[slot], value);
        }

        for (slot, key) in keys.iter().enumerate() {
            let got = snapshot.value(*key);
            let want = snapshot_oracle.get(&slot);
            prop_assert_eq!(got.as_deref(), want);
        }
    }

    #[test]
    fn siblings_are_isolated(
        ops in proptest::collection::vec((0usize..KEY_SLOTS, any::<u32>()), 1..16)
    ) {
        init_test_logging();
        let keys: Vec<Key<u32>> = (0..KEY_SLOTS).map(|_| Key::new()).collect();

        let root = Context::background();
        let mut branch = root.clone();
        for &(slot, value) in &ops {
            branch = branch.with_value(keys[slot], value);
        }

        let (sibling, _cancel) = root.with_cancel();
        for key in &keys {
            prop_assert_eq!(sibling.value(*key), None);
        }
    }
}
