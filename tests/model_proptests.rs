//! Model-based property tests.
//!
//! Random operation sequences run against the engine and a naive model in
//! parallel; after every operation the observable state must match and
//! the cross-index bookkeeping must verify.

use multi_index::{
    HashUnique, IndexSpec, MultiIndex, OrdMulti, OrdUnique, StableNode, TranslationArray,
    TranslationArrayTombstones, UpdatePointer, UpdatePointerTombstones,
};
use proptest::prelude::*;
use std::collections::HashMap;

struct ByLen;
impl IndexSpec<u8, String> for ByLen {
    type Family = OrdMulti;
    type SecKey = usize;
    fn project(_key: &u8, payload: &String) -> usize {
        payload.len()
    }
}

fn value(v: u8) -> String {
    // length varies with the value so the secondary projection does too
    "x".repeat((v % 7) as usize + 1)
}

macro_rules! maybe_compact {
    (true, $engine:ident) => {
        $engine.compact()
    };
    (false, $engine:ident) => {};
}

macro_rules! unique_model_test {
    ($name:ident, $policy:ty, $primary:ty, $compactable:tt) => {
        proptest! {
            #[test]
            fn $name(ops in proptest::collection::vec((0u8..=4, 0u8..8, 0u8..64), 1..120)) {
                let mut engine: MultiIndex<u8, String, $policy, $primary, (ByLen,)> =
                    MultiIndex::new();
                let mut model: HashMap<u8, String> = HashMap::new();

                for (op, key, raw) in ops {
                    let v = value(raw);
                    match op {
                        // insert
                        0 => {
                            let inserted = engine.insert(key, v.clone()).is_ok();
                            prop_assert_eq!(inserted, !model.contains_key(&key));
                            if inserted {
                                model.insert(key, v);
                            }
                        }
                        // remove by key
                        1 => {
                            let removed = engine.remove(&key);
                            prop_assert_eq!(removed, model.remove(&key).is_some() as usize);
                        }
                        // modify through a handle
                        2 => {
                            match engine.find(&key) {
                                Some(h) => {
                                    prop_assert!(model.contains_key(&key));
                                    prop_assert!(engine.modify(h, |p| *p = v.clone()));
                                    model.insert(key, v);
                                }
                                None => prop_assert!(!model.contains_key(&key)),
                            }
                        }
                        // replace through a handle
                        3 => {
                            if let Some(h) = engine.find(&key) {
                                prop_assert!(engine.replace(h, v.clone()));
                                model.insert(key, v);
                            }
                        }
                        // compact, where the policy supports it
                        4 => {
                            maybe_compact!($compactable, engine);
                        }
                        _ => unreachable!(),
                    }

                    prop_assert_eq!(engine.len(), model.len());
                    prop_assert_eq!(engine.contains_key(&key), model.contains_key(&key));
                    prop_assert_eq!(
                        engine.find(&key).and_then(|h| h.payload(&engine)),
                        model.get(&key)
                    );
                    if let Err(msg) = engine.check_invariants() {
                        prop_assert!(false, "invariant breach: {}", msg);
                    }
                }

                // the secondary answers every surviving projection
                for (k, p) in &model {
                    let found = engine
                        .view::<ByLen, _>()
                        .equal_range(&p.len())
                        .any(|h| h.key(&engine) == Some(k));
                    prop_assert!(found, "secondary lost key {}", k);
                }
            }
        }
    };
}

unique_model_test!(stable_node_matches_model, StableNode, OrdUnique, false);
unique_model_test!(update_pointer_matches_model, UpdatePointer, HashUnique, false);
unique_model_test!(
    update_pointer_tombstones_matches_model,
    UpdatePointerTombstones,
    HashUnique,
    true
);
unique_model_test!(
    translation_array_matches_model,
    TranslationArray,
    OrdUnique,
    true
);
unique_model_test!(
    translation_array_tombstones_matches_model,
    TranslationArrayTombstones,
    OrdUnique,
    true
);

proptest! {
    /// Multi primary: per-key payload multisets follow the model through
    /// inserts, range erases and revivals.
    #[test]
    fn multi_primary_matches_model(ops in proptest::collection::vec((0u8..=1, 0u8..5, 0u8..64), 1..120)) {
        let mut engine: MultiIndex<u8, String, UpdatePointerTombstones, OrdMulti, (ByLen,)> =
            MultiIndex::new();
        let mut model: HashMap<u8, Vec<String>> = HashMap::new();

        for (op, key, raw) in ops {
            let v = value(raw);
            match op {
                0 => {
                    engine.insert(key, v.clone()).unwrap();
                    model.entry(key).or_default().push(v);
                }
                1 => {
                    let removed = engine.remove(&key);
                    let expected = model.remove(&key).map_or(0, |b| b.len());
                    prop_assert_eq!(removed, expected);
                }
                _ => unreachable!(),
            }

            let model_len: usize = model.values().map(Vec::len).sum();
            prop_assert_eq!(engine.len(), model_len);
            prop_assert_eq!(
                engine.count(&key),
                model.get(&key).map_or(0, |b| b.len())
            );

            let mut engine_bucket: Vec<String> =
                engine.equal_range(&key).map(|(_, _, p)| p.clone()).collect();
            let mut model_bucket = model.get(&key).cloned().unwrap_or_default();
            engine_bucket.sort();
            model_bucket.sort();
            prop_assert_eq!(engine_bucket, model_bucket);

            if let Err(msg) = engine.check_invariants() {
                prop_assert!(false, "invariant breach: {}", msg);
            }
        }
    }
}

proptest! {
    /// Key-storing policy: secondary resolution through the primary stays
    /// exact under churn.
    #[test]
    fn key_lookup_matches_model(ops in proptest::collection::vec((0u8..=2, 0u8..8, 0u8..64), 1..100)) {
        let mut engine: MultiIndex<u8, String, multi_index::KeyLookup, HashUnique, (ByLen,)> =
            MultiIndex::new();
        let mut model: HashMap<u8, String> = HashMap::new();

        for (op, key, raw) in ops {
            let v = value(raw);
            match op {
                0 => {
                    if engine.insert(key, v.clone()).is_ok() {
                        model.insert(key, v);
                    }
                }
                1 => {
                    let removed = engine.remove(&key);
                    prop_assert_eq!(removed, model.remove(&key).is_some() as usize);
                }
                2 => {
                    if let Some(h) = engine.find(&key) {
                        prop_assert!(engine.modify(h, |p| *p = v.clone()));
                        model.insert(key, v);
                    }
                }
                _ => unreachable!(),
            }

            prop_assert_eq!(engine.len(), model.len());
            if let Err(msg) = engine.check_invariants() {
                prop_assert!(false, "invariant breach: {}", msg);
            }
        }

        for (k, p) in &model {
            let found = engine
                .view::<ByLen, _>()
                .equal_range(&p.len())
                .any(|h| h.key(&engine) == Some(k));
            prop_assert!(found, "secondary lost key {}", k);
        }
    }
}
