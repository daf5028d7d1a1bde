//! # celltrie
//!
//! A memory-compact ordered map built on a radix trie of 8-byte cells.
//!
//! Every structure in the tree — path-compression runs, branch nodes,
//! child pointers, even small values — is a 64-bit cell, and a node is
//! a contiguous run of cells reached through one pointer whose unused
//! high bits carry the interpretation tag. Short key runs pack inline
//! (HOP), long ones follow a length header (SKIP), small branches are
//! a sorted byte list searched with SWAR (LIST), large ones a 256-bit
//! bitmap with popcount indexing (POP).
//!
//! Operations cost O(key length) regardless of how many keys are
//! stored, and iteration always yields keys in order.
//!
//! ## Example
//!
//! ```rust
//! use celltrie::TrieMap;
//!
//! let mut map: TrieMap<u64, &str> = TrieMap::new();
//! map.insert(2, "two");
//! map.insert(1, "one");
//! map.insert(3, "three");
//!
//! assert_eq!(map.get(&2), Some(&"two"));
//! let keys: Vec<u64> = map.iter().map(|(k, _)| k).collect();
//! assert_eq!(keys, [1, 2, 3]);
//! ```
//!
//! String and byte-string keys share prefixes structurally; integer
//! keys are stored big-endian (sign-flipped when signed) so byte order
//! equals numeric order.

mod alloc;
mod cell;
mod debug;
mod hop;
mod insert;
mod key;
mod list;
mod map;
mod nav;
mod pop;
mod raw;
mod remove;
mod skip;
mod value;
mod walker;

pub use debug::TrieStats;
pub use key::TrieKey;
pub use map::{Iter, Range, TrieMap};
pub use raw::RawTrie;

// The tagged-pointer layout needs 64-bit pointers with free high bits.
const _: () = assert!(
    core::mem::size_of::<usize>() == 8,
    "celltrie requires a 64-bit target"
);

#[cfg(test)]
mod proptests;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_family() {
        let mut t: RawTrie<u32> = RawTrie::new();
        t.insert(b"hello", 1);
        t.insert(b"help", 2);
        t.insert(b"he", 3);
        assert_eq!(t.len(), 3);
        assert_eq!(t.get(b"he"), Some(&3));
        assert_eq!(t.get(b"hel"), None);

        let mut items = Vec::new();
        let mut cur = t.first();
        while let Some((k, v)) = cur {
            items.push((k.clone(), *v));
            cur = t.next(&k, false);
        }
        assert_eq!(
            items,
            vec![
                (b"he".to_vec(), 3),
                (b"hello".to_vec(), 1),
                (b"help".to_vec(), 2),
            ]
        );
    }

    #[test]
    fn test_list_promotes_to_pop_at_eight() {
        let mut t: RawTrie<u32> = RawTrie::new();
        for (i, b) in (b'a'..=b'g').enumerate() {
            t.insert(&[b], i as u32);
        }
        assert_eq!(t.stats().list_count, 1);
        assert_eq!(t.stats().pop_count, 0);

        t.insert(b"h", 7);
        assert_eq!(t.stats().list_count, 0);
        assert_eq!(t.stats().pop_count, 1);

        for (i, b) in (b'a'..=b'h').enumerate() {
            assert_eq!(t.get(&[b]), Some(&(i as u32)), "byte {}", b as char);
        }
        let keys: Vec<Vec<u8>> = iterate_keys(&t);
        let expected: Vec<Vec<u8>> = (b'a'..=b'h').map(|b| vec![b]).collect();
        assert_eq!(keys, expected);
        assert!(t.verify_integrity().is_empty());
    }

    #[test]
    fn test_pop_demotes_to_list_at_seven() {
        let mut t: RawTrie<u32> = RawTrie::new();
        for (i, b) in (b'a'..=b'h').enumerate() {
            t.insert(&[b], i as u32);
        }
        assert_eq!(t.stats().pop_count, 1);

        assert_eq!(t.remove(b"a"), Some(0));
        assert_eq!(t.stats().pop_count, 0);
        assert_eq!(t.stats().list_count, 1);
        assert_eq!(t.len(), 7);

        let keys: Vec<Vec<u8>> = iterate_keys(&t);
        let expected: Vec<Vec<u8>> = (b'b'..=b'h').map(|b| vec![b]).collect();
        assert_eq!(keys, expected);
        assert!(t.verify_integrity().is_empty());
    }

    #[test]
    fn test_hop_skip_length_boundary() {
        // Exactly 6 shared bytes compress as a HOP, exactly 7 as SKIP.
        let mut t: RawTrie<u32> = RawTrie::new();
        t.insert(b"abcdef", 1);
        let s = t.stats();
        assert_eq!((s.hop_count, s.skip_count), (1, 0));

        let mut t: RawTrie<u32> = RawTrie::new();
        t.insert(b"abcdefg", 1);
        let s = t.stats();
        assert_eq!((s.hop_count, s.skip_count), (0, 1));
        assert_eq!(s.skip_total_len, 7);
    }

    #[test]
    fn test_million_random_u64_keys() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        let mut map: TrieMap<u64, u64> = TrieMap::new();
        let mut keys: Vec<u64> = (0..1_000_000).map(|_| rng.gen()).collect();
        for &k in &keys {
            map.insert(k, !k);
        }
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(map.len(), keys.len());

        for &k in keys.iter().step_by(997) {
            assert_eq!(map.get(&k), Some(&!k));
        }

        let iterated: Vec<u64> = map.keys().collect();
        assert_eq!(iterated, keys);

        for &k in &keys {
            assert_eq!(map.remove(&k), Some(!k));
        }
        assert!(map.is_empty());
    }

    #[test]
    fn test_signed_key_ordering() {
        let mut map: TrieMap<i32, u8> = TrieMap::new();
        for k in [i32::MIN, -1, 0, 1, i32::MAX] {
            map.insert(k, 0);
        }
        let keys: Vec<i32> = map.keys().collect();
        assert_eq!(keys, [i32::MIN, -1, 0, 1, i32::MAX]);
    }

    #[test]
    fn test_adversarial_prefix_chain() {
        let mut t: RawTrie<u32> = RawTrie::new();
        let keys: Vec<Vec<u8>> = (1..=20).map(|n| vec![b'a'; n]).collect();
        for (i, k) in keys.iter().enumerate() {
            t.insert(k, i as u32);
        }
        assert_eq!(t.len(), 20);
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(t.get(k), Some(&(i as u32)));
        }
        assert_eq!(iterate_keys(&t), keys);
        assert!(t.verify_integrity().is_empty());

        for k in keys.iter().rev() {
            assert!(t.remove(k).is_some());
            assert!(t.verify_integrity().is_empty(), "after removing {:?}", k);
        }
        assert!(t.is_empty());
    }

    #[test]
    fn test_remove_shared_then_diverging_runs() {
        // Pairs sharing a long run then diverging stress the
        // trailing-run truncation paths of remove.
        let stems: &[&[u8]] = &[b"x", b"abc", b"abcdefgh", b"abcdefghijklmnop"];
        for &stem in stems {
            for split in 0..stem.len() {
                let mut a = stem.to_vec();
                a.extend_from_slice(b"left");
                let mut b = stem[..split].to_vec();
                b.extend_from_slice(b"right");

                let mut t: RawTrie<u32> = RawTrie::new();
                t.insert(stem, 0);
                t.insert(&a, 1);
                t.insert(&b, 2);
                assert!(t.verify_integrity().is_empty());

                assert_eq!(t.remove(&a), Some(1));
                assert!(t.verify_integrity().is_empty(), "stem {stem:?} split {split}");
                assert_eq!(t.get(stem), Some(&0));
                assert_eq!(t.get(&b), Some(&2));

                assert_eq!(t.remove(stem), Some(0));
                assert!(t.verify_integrity().is_empty());
                assert_eq!(t.get(&b), Some(&2));

                assert_eq!(t.remove(&b), Some(2));
                assert!(t.is_empty());
                assert!(t.verify_integrity().is_empty());
            }
        }
    }

    #[test]
    fn test_reinsert_at_removed_junction() {
        // Removing the middle key of a prefix chain leaves two runs
        // back to back; re-inserting that key must splice its EOS
        // between them, and everything stays retrievable.
        let mut t: RawTrie<u32> = RawTrie::new();
        t.insert(b"a", 1);
        t.insert(b"ab", 2);
        t.insert(b"abcd", 3);
        assert_eq!(t.remove(b"ab"), Some(2));
        assert!(t.verify_integrity().is_empty());
        assert_eq!(t.get(b"a"), Some(&1));
        assert_eq!(t.get(b"abcd"), Some(&3));

        assert_eq!(t.insert(b"ab", 20), None);
        assert!(t.verify_integrity().is_empty());
        assert_eq!(t.get(b"a"), Some(&1));
        assert_eq!(t.get(b"ab"), Some(&20));
        assert_eq!(t.get(b"abcd"), Some(&3));
        assert_eq!(
            iterate_keys(&t),
            vec![b"a".to_vec(), b"ab".to_vec(), b"abcd".to_vec()]
        );

        // The same junction must also be visible to navigation.
        assert_eq!(t.next(b"a", false).unwrap().0, b"ab");
        assert_eq!(t.prev(b"abcd", false).unwrap().0, b"ab");
    }

    #[test]
    fn test_soak_against_btreemap() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};
        use std::collections::BTreeMap;

        let mut rng = StdRng::seed_from_u64(2);
        let mut t: RawTrie<u64> = RawTrie::new();
        let mut m: BTreeMap<Vec<u8>, u64> = BTreeMap::new();

        for round in 0..50_000 {
            let op = rng.gen_range(0..100);
            let len = rng.gen_range(0..20);
            let key: Vec<u8> = (0..len).map(|_| rng.gen_range(b'a'..=b'f')).collect();

            match op {
                0..=44 => {
                    let v: u64 = rng.gen();
                    assert_eq!(t.insert(&key, v), m.insert(key, v));
                }
                45..=74 => {
                    assert_eq!(t.remove(&key), m.remove(&key));
                }
                75..=84 => {
                    assert_eq!(t.get(&key), m.get(&key));
                }
                85..=92 => {
                    let got = t.next(&key, true).map(|(k, v)| (k, *v));
                    let want = m.range(key.clone()..).next().map(|(k, v)| (k.clone(), *v));
                    assert_eq!(got, want);
                }
                _ => {
                    let got = t.prev(&key, false).map(|(k, v)| (k, *v));
                    let want = m.range(..key.clone()).next_back().map(|(k, v)| (k.clone(), *v));
                    assert_eq!(got, want);
                }
            }
            assert_eq!(t.len(), m.len());
            if round % 5000 == 0 {
                assert!(t.verify_integrity().is_empty(), "round {round}");
            }
        }

        let got: Vec<(Vec<u8>, u64)> = {
            let mut out = Vec::new();
            let mut cur = t.first();
            while let Some((k, v)) = cur {
                out.push((k.clone(), *v));
                cur = t.next(&k, false);
            }
            out
        };
        let want: Vec<(Vec<u8>, u64)> = m.iter().map(|(k, v)| (k.clone(), *v)).collect();
        assert_eq!(got, want);
        assert!(t.verify_integrity().is_empty());
    }

    #[test]
    fn test_prev_next_duality() {
        let mut t: RawTrie<u32> = RawTrie::new();
        let keys: Vec<&[u8]> = vec![b"a", b"ab", b"abc", b"b", b"ba", b"c"];
        for (i, k) in keys.iter().enumerate() {
            t.insert(k, i as u32);
        }
        // For a stored key, the greatest key strictly below its
        // successor is the key itself.
        for k in &keys {
            if let Some((succ, _)) = t.next(k, false) {
                let (back, _) = t.prev(&succ, false).unwrap();
                assert_eq!(back.as_slice(), *k);
            }
        }
    }

    #[test]
    fn test_wide_branch_every_byte() {
        let mut t: RawTrie<u16> = RawTrie::new();
        for b in 0..=255u8 {
            t.insert(&[b, b], b as u16);
        }
        assert_eq!(t.len(), 256);
        assert_eq!(t.stats().pop_count, 1);
        assert!(t.verify_integrity().is_empty());
        let keys = iterate_keys(&t);
        assert_eq!(keys.len(), 256);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));

        for b in (0..=255u8).step_by(3) {
            assert_eq!(t.remove(&[b, b]), Some(b as u16));
        }
        assert!(t.verify_integrity().is_empty());
        assert_eq!(t.len(), 256 - 86);
    }

    #[test]
    fn test_large_values_boxed() {
        type Big = [u64; 4];
        let mut t: RawTrie<Big> = RawTrie::new();
        for i in 0..100u64 {
            t.insert(format!("key{i}").as_bytes(), [i, i + 1, i + 2, i + 3]);
        }
        for i in 0..100u64 {
            assert_eq!(
                t.get(format!("key{i}").as_bytes()),
                Some(&[i, i + 1, i + 2, i + 3])
            );
        }
        assert_eq!(t.remove(b"key42"), Some([42, 43, 44, 45]));
        assert_eq!(t.len(), 99);
    }

    #[test]
    fn test_float_values_bit_exact() {
        let mut t: RawTrie<f64> = RawTrie::new();
        t.insert(b"negzero", -0.0);
        t.insert(b"pi", core::f64::consts::PI);
        assert_eq!(t.get(b"negzero").unwrap().to_bits(), (-0.0f64).to_bits());
        assert_eq!(t.get(b"pi"), Some(&core::f64::consts::PI));
    }

    fn iterate_keys<V>(t: &RawTrie<V>) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut cur = t.first().map(|(k, _)| k);
        while let Some(k) = cur {
            out.push(k.clone());
            cur = t.next(&k, false).map(|(k, _)| k);
        }
        out
    }
}
