use std::collections::BTreeMap;

use proptest::prelude::*;
use proptest_derive::Arbitrary;

use crate::RawTrie;

/// Reference implementation the trie is checked against.
#[derive(Default)]
struct Model {
    map: BTreeMap<Vec<u8>, u64>,
}

#[derive(Arbitrary, Debug, Clone)]
enum Action {
    Insert(KeyValue),
    TryInsert(KeyValue),
    Get(Key),
    Remove(Key),
    LowerBound(Key),
    UpperBound(Key),
    PrevInclusive(Key),
    PrevExclusive(Key),
}

#[derive(Debug, Clone)]
struct Key(Vec<u8>);

#[derive(Debug, Clone)]
struct KeyValue {
    key: Key,
    value: u64,
}

impl Arbitrary for Key {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            // Empty key
            Just(Key(vec![])),
            // Short arbitrary keys
            prop::collection::vec(any::<u8>(), 1..4).prop_map(Key),
            // Longer keys from a tiny alphabet force shared runs and
            // splits at every position
            prop::collection::vec(prop_oneof![Just(b'a'), Just(b'b'), Just(b'c')], 1..24)
                .prop_map(Key),
            // Keys crossing the 6-byte HOP/SKIP boundary
            prop::collection::vec(any::<u8>(), 5..9).prop_map(Key),
            // Keys with a fixed stem and varied tails
            prop::collection::vec(any::<u8>(), 0..6).prop_map(|tail| {
                let mut key = b"shared-stem/".to_vec();
                key.extend_from_slice(&tail);
                Key(key)
            }),
        ]
        .boxed()
    }
}

impl Arbitrary for KeyValue {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (any::<Key>(), any::<u64>())
            .prop_map(|(key, value)| KeyValue { key, value })
            .boxed()
    }
}

#[derive(Default)]
struct Test {
    trie: RawTrie<u64>,
    model: Model,
}

impl Test {
    fn execute(&mut self, action: Action) {
        match action {
            Action::Insert(kv) => {
                let key = kv.key.0;
                let trie_old = self.trie.insert(&key, kv.value);
                let model_old = self.model.map.insert(key.clone(), kv.value);
                assert_eq!(trie_old, model_old, "insert mismatch: key={key:?}");
            }
            Action::TryInsert(kv) => {
                let key = kv.key.0;
                let trie_new = self.trie.try_insert(&key, kv.value).is_ok();
                let model_new = !self.model.map.contains_key(&key);
                if model_new {
                    self.model.map.insert(key.clone(), kv.value);
                }
                assert_eq!(trie_new, model_new, "try_insert mismatch: key={key:?}");
            }
            Action::Get(key) => {
                assert_eq!(
                    self.trie.get(&key.0),
                    self.model.map.get(&key.0),
                    "get mismatch: key={:?}",
                    key.0
                );
            }
            Action::Remove(key) => {
                assert_eq!(
                    self.trie.remove(&key.0),
                    self.model.map.remove(&key.0),
                    "remove mismatch: key={:?}",
                    key.0
                );
            }
            Action::LowerBound(key) => {
                let got = self.trie.next(&key.0, true).map(|(k, v)| (k, *v));
                let want = self
                    .model
                    .map
                    .range(key.0.clone()..)
                    .next()
                    .map(|(k, v)| (k.clone(), *v));
                assert_eq!(got, want, "lower_bound mismatch: key={:?}", key.0);
            }
            Action::UpperBound(key) => {
                let got = self.trie.next(&key.0, false).map(|(k, v)| (k, *v));
                let want = self
                    .model
                    .map
                    .range((
                        std::ops::Bound::Excluded(key.0.clone()),
                        std::ops::Bound::Unbounded,
                    ))
                    .next()
                    .map(|(k, v)| (k.clone(), *v));
                assert_eq!(got, want, "upper_bound mismatch: key={:?}", key.0);
            }
            Action::PrevInclusive(key) => {
                let got = self.trie.prev(&key.0, true).map(|(k, v)| (k, *v));
                let want = self
                    .model
                    .map
                    .range(..=key.0.clone())
                    .next_back()
                    .map(|(k, v)| (k.clone(), *v));
                assert_eq!(got, want, "prev(incl) mismatch: key={:?}", key.0);
            }
            Action::PrevExclusive(key) => {
                let got = self.trie.prev(&key.0, false).map(|(k, v)| (k, *v));
                let want = self
                    .model
                    .map
                    .range(..key.0.clone())
                    .next_back()
                    .map(|(k, v)| (k.clone(), *v));
                assert_eq!(got, want, "prev(excl) mismatch: key={:?}", key.0);
            }
        }
        assert_eq!(self.trie.len(), self.model.map.len(), "length mismatch");
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn proptest_vs_btreemap(actions in prop::collection::vec(any::<Action>(), 1..96)) {
        let mut test = Test::default();
        for action in actions {
            test.execute(action);
        }
        // Full structural audit and ordered-iteration equality at the end.
        prop_assert_eq!(test.trie.verify_integrity(), Vec::<String>::new());
        let mut cur = test.trie.first();
        let mut got = Vec::new();
        while let Some((k, v)) = cur {
            got.push((k.clone(), *v));
            cur = test.trie.next(&k, false);
        }
        let want: Vec<(Vec<u8>, u64)> =
            test.model.map.iter().map(|(k, v)| (k.clone(), *v)).collect();
        prop_assert_eq!(got, want);
    }

    #[test]
    fn proptest_insert_remove_all(keys in prop::collection::vec(any::<Key>(), 1..48)) {
        let mut trie: RawTrie<u64> = RawTrie::new();
        let mut model: BTreeMap<Vec<u8>, u64> = BTreeMap::new();
        for (i, k) in keys.iter().enumerate() {
            trie.insert(&k.0, i as u64);
            model.insert(k.0.clone(), i as u64);
        }
        prop_assert_eq!(trie.len(), model.len());
        prop_assert_eq!(trie.verify_integrity(), Vec::<String>::new());
        // Remove in reverse insertion order; the tree must stay sound
        // at every step and end empty.
        for k in keys.iter().rev() {
            let trie_removed = trie.remove(&k.0);
            let model_removed = model.remove(&k.0);
            prop_assert_eq!(trie_removed, model_removed);
            prop_assert_eq!(trie.verify_integrity(), Vec::<String>::new());
        }
        prop_assert!(trie.is_empty());
    }
}
