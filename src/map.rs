//! The typed ordered-map facade.
//!
//! [`TrieMap`] layers a [`TrieKey`] encoding over [`RawTrie`]. All
//! ordering statements (iteration, bounds, `range`) are in key-encoded
//! byte order, which the encodings guarantee equals the natural order
//! of the key type.

use core::fmt;
use core::marker::PhantomData;
use core::ops::{Bound, RangeBounds};

use crate::key::TrieKey;
use crate::raw::RawTrie;

/// An ordered map from `K` to `V` backed by a compact radix trie.
///
/// ```
/// use celltrie::TrieMap;
///
/// let mut map: TrieMap<String, u32> = TrieMap::new();
/// map.insert("one".to_string(), 1);
/// map.insert("two".to_string(), 2);
///
/// assert_eq!(map.get(&"one".to_string()), Some(&1));
/// let keys: Vec<String> = map.iter().map(|(k, _)| k).collect();
/// assert_eq!(keys, ["one", "two"]);
/// ```
pub struct TrieMap<K: TrieKey, V> {
    raw: RawTrie<V>,
    _key: PhantomData<K>,
}

impl<K: TrieKey, V> TrieMap<K, V> {
    pub fn new() -> Self {
        TrieMap {
            raw: RawTrie::with_fixed_len(K::FIXED_LEN),
            _key: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Direct access to the byte-keyed core.
    pub fn raw(&self) -> &RawTrie<V> {
        &self.raw
    }

    /// Inserts or replaces, returning the previous value.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.raw.insert(key.encode().as_ref(), value)
    }

    /// Inserts only if absent; on occupied returns the value back.
    pub fn try_insert(&mut self, key: K, value: V) -> Result<&mut V, V> {
        self.raw.try_insert(key.encode().as_ref(), value)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.raw.get(key.encode().as_ref())
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.raw.get_mut(key.encode().as_ref())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.raw.contains_key(key.encode().as_ref())
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.raw.remove(key.encode().as_ref())
    }

    /// The smallest entry.
    pub fn first(&self) -> Option<(K, &V)> {
        self.raw.first().map(|(k, v)| (K::decode(&k), v))
    }

    /// The largest entry.
    pub fn last(&self) -> Option<(K, &V)> {
        self.raw.last().map(|(k, v)| (K::decode(&k), v))
    }

    /// Least entry `>= key` (`inclusive`) or `> key`.
    pub fn next(&self, key: &K, inclusive: bool) -> Option<(K, &V)> {
        self.raw
            .next(key.encode().as_ref(), inclusive)
            .map(|(k, v)| (K::decode(&k), v))
    }

    /// Greatest entry `<= key` (`inclusive`) or `< key`.
    pub fn prev(&self, key: &K, inclusive: bool) -> Option<(K, &V)> {
        self.raw
            .prev(key.encode().as_ref(), inclusive)
            .map(|(k, v)| (K::decode(&k), v))
    }

    /// Least entry with key `>= key`.
    pub fn lower_bound(&self, key: &K) -> Option<(K, &V)> {
        self.next(key, true)
    }

    /// Least entry with key `> key`.
    pub fn upper_bound(&self, key: &K) -> Option<(K, &V)> {
        self.next(key, false)
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            map: self,
            cursor: Cursor::Start,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    /// Entries whose keys fall inside `range`, ascending.
    pub fn range<R: RangeBounds<K>>(&self, range: R) -> Range<'_, K, V> {
        let start = match range.start_bound() {
            Bound::Unbounded => Cursor::Start,
            Bound::Included(k) => Cursor::Bound(k.encode().as_ref().to_vec(), true),
            Bound::Excluded(k) => Cursor::Bound(k.encode().as_ref().to_vec(), false),
        };
        let end = match range.end_bound() {
            Bound::Unbounded => None,
            Bound::Included(k) => Some((k.encode().as_ref().to_vec(), true)),
            Bound::Excluded(k) => Some((k.encode().as_ref().to_vec(), false)),
        };
        Range {
            map: self,
            cursor: start,
            end,
        }
    }
}

enum Cursor {
    Start,
    Bound(Vec<u8>, bool),
    After(Vec<u8>),
    Done,
}

impl Cursor {
    fn step<'a, V>(&mut self, raw: &'a RawTrie<V>) -> Option<(Vec<u8>, &'a V)> {
        let hit = match self {
            Cursor::Start => raw.first(),
            Cursor::Bound(k, inclusive) => raw.next(k, *inclusive),
            Cursor::After(k) => raw.next(k, false),
            Cursor::Done => None,
        };
        match &hit {
            Some((k, _)) => *self = Cursor::After(k.clone()),
            None => *self = Cursor::Done,
        }
        hit
    }
}

/// Ascending iterator over all entries.
pub struct Iter<'a, K: TrieKey, V> {
    map: &'a TrieMap<K, V>,
    cursor: Cursor,
}

impl<'a, K: TrieKey, V> Iterator for Iter<'a, K, V> {
    type Item = (K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor
            .step(&self.map.raw)
            .map(|(k, v)| (K::decode(&k), v))
    }
}

/// Ascending iterator over a key range.
pub struct Range<'a, K: TrieKey, V> {
    map: &'a TrieMap<K, V>,
    cursor: Cursor,
    end: Option<(Vec<u8>, bool)>,
}

impl<'a, K: TrieKey, V> Iterator for Range<'a, K, V> {
    type Item = (K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let (k, v) = self.cursor.step(&self.map.raw)?;
        if let Some((end, inclusive)) = &self.end {
            let past = if *inclusive {
                k > *end
            } else {
                k >= *end
            };
            if past {
                self.cursor = Cursor::Done;
                return None;
            }
        }
        Some((K::decode(&k), v))
    }
}

impl<K: TrieKey, V> Default for TrieMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: TrieKey, V: Clone> Clone for TrieMap<K, V> {
    fn clone(&self) -> Self {
        TrieMap {
            raw: self.raw.clone(),
            _key: PhantomData,
        }
    }
}

impl<K: TrieKey, V> FromIterator<(K, V)> for TrieMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = TrieMap::new();
        map.extend(iter);
        map
    }
}

impl<K: TrieKey, V> Extend<(K, V)> for TrieMap<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K: TrieKey + fmt::Debug, V: fmt::Debug> fmt::Debug for TrieMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
