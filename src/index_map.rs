//! Container families backing the primary and secondary indices.
//!
//! Any container satisfying [`IndexMap`] can serve as an index. The
//! built-in families cover the ordered/hashed and unique/multi axes;
//! hashed families use `hashbrown`, ordered families `BTreeMap`.

use core::fmt;
use core::hash::Hash;
use std::collections::btree_map;
use std::collections::BTreeMap;

/// Bounds every index key must satisfy, primary or secondary. Both `Ord`
/// and `Hash` are required so one key type works under every family.
pub trait IndexKey: Clone + Ord + Eq + Hash + fmt::Debug {}

impl<T: Clone + Ord + Eq + Hash + fmt::Debug> IndexKey for T {}

/// Bounds on values stored in index maps (positions, ordinals, or
/// primary keys, depending on the policy).
pub trait RefValue: Clone + PartialEq + fmt::Debug {}

impl<T: Clone + PartialEq + fmt::Debug> RefValue for T {}

/// Contract required of a backing container.
///
/// Entries under one key keep insertion order in multi variants; that
/// order is the "bucket order" revival and removal operate in.
pub trait IndexMap<K, V>: Default {
    const UNIQUE: bool;

    /// Insert an entry. Unique maps reject an occupied key and leave the
    /// existing entry untouched.
    fn insert(&mut self, key: K, value: V) -> bool;

    fn get_first(&self, key: &K) -> Option<&V>;

    /// All entries under `key`, in bucket order.
    fn for_key<'a>(&'a self, key: &'a K) -> impl Iterator<Item = &'a V> + 'a
    where
        V: 'a;

    /// Remove the first entry under `key` matching `pred`.
    fn remove_first(&mut self, key: &K, pred: impl FnMut(&V) -> bool) -> Option<V>;

    /// Overwrite the first entry under `key` matching `pred`.
    fn replace_first(&mut self, key: &K, pred: impl FnMut(&V) -> bool, value: V) -> bool;

    fn iter<'a>(&'a self) -> impl Iterator<Item = (&'a K, &'a V)>
    where
        K: 'a,
        V: 'a;

    fn len(&self) -> usize;
    fn clear(&mut self);

    fn contains(&self, key: &K) -> bool {
        self.get_first(key).is_some()
    }
    fn key_count(&self, key: &K) -> usize {
        self.for_key(key).count()
    }
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn reserve(&mut self, _additional: usize) {}
}

/// Produces the concrete map for a (key, value) pair.
pub trait MapFamily {
    type Map<K: IndexKey, V: RefValue>: IndexMap<K, V>;
}

/// Families whose maps hold at most one entry per key. Operations that
/// need a unique primary (edit proxies, key-storing policies) bound on
/// this marker.
pub trait UniqueMapFamily: MapFamily {}

/// Ordered unique family.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrdUnique;

/// Ordered multi family.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrdMulti;

/// Hashed unique family.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashUnique;

/// Hashed multi family.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashMulti;

impl MapFamily for OrdUnique {
    type Map<K: IndexKey, V: RefValue> = BTreeUniqueMap<K, V>;
}
impl UniqueMapFamily for OrdUnique {}

impl MapFamily for OrdMulti {
    type Map<K: IndexKey, V: RefValue> = BTreeMultiMap<K, V>;
}

impl MapFamily for HashUnique {
    type Map<K: IndexKey, V: RefValue> = HashUniqueMap<K, V>;
}
impl UniqueMapFamily for HashUnique {}

impl MapFamily for HashMulti {
    type Map<K: IndexKey, V: RefValue> = HashMultiMap<K, V>;
}

#[derive(Debug, Clone)]
pub struct BTreeUniqueMap<K, V>(BTreeMap<K, V>);

impl<K, V> Default for BTreeUniqueMap<K, V> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<K: IndexKey, V: RefValue> IndexMap<K, V> for BTreeUniqueMap<K, V> {
    const UNIQUE: bool = true;

    fn insert(&mut self, key: K, value: V) -> bool {
        match self.0.entry(key) {
            btree_map::Entry::Occupied(_) => false,
            btree_map::Entry::Vacant(e) => {
                e.insert(value);
                true
            }
        }
    }

    fn get_first(&self, key: &K) -> Option<&V> {
        self.0.get(key)
    }

    fn for_key<'a>(&'a self, key: &'a K) -> impl Iterator<Item = &'a V> + 'a
    where
        V: 'a,
    {
        self.0.get(key).into_iter()
    }

    fn remove_first(&mut self, key: &K, mut pred: impl FnMut(&V) -> bool) -> Option<V> {
        if pred(self.0.get(key)?) {
            self.0.remove(key)
        } else {
            None
        }
    }

    fn replace_first(&mut self, key: &K, mut pred: impl FnMut(&V) -> bool, value: V) -> bool {
        match self.0.get_mut(key) {
            Some(v) if pred(v) => {
                *v = value;
                true
            }
            _ => false,
        }
    }

    fn iter<'a>(&'a self) -> impl Iterator<Item = (&'a K, &'a V)>
    where
        K: 'a,
        V: 'a,
    {
        self.0.iter()
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

#[derive(Debug, Clone)]
pub struct BTreeMultiMap<K, V>(BTreeMap<K, Vec<V>>);

impl<K, V> Default for BTreeMultiMap<K, V> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<K: IndexKey, V: RefValue> IndexMap<K, V> for BTreeMultiMap<K, V> {
    const UNIQUE: bool = false;

    fn insert(&mut self, key: K, value: V) -> bool {
        self.0.entry(key).or_default().push(value);
        true
    }

    fn get_first(&self, key: &K) -> Option<&V> {
        self.0.get(key).and_then(|bucket| bucket.first())
    }

    fn for_key<'a>(&'a self, key: &'a K) -> impl Iterator<Item = &'a V> + 'a
    where
        V: 'a,
    {
        self.0.get(key).into_iter().flatten()
    }

    fn remove_first(&mut self, key: &K, pred: impl FnMut(&V) -> bool) -> Option<V> {
        let bucket = self.0.get_mut(key)?;
        let i = bucket.iter().position(pred)?;
        let v = bucket.remove(i);
        if bucket.is_empty() {
            self.0.remove(key);
        }
        Some(v)
    }

    fn replace_first(&mut self, key: &K, mut pred: impl FnMut(&V) -> bool, value: V) -> bool {
        let Some(bucket) = self.0.get_mut(key) else {
            return false;
        };
        for v in bucket.iter_mut() {
            if pred(v) {
                *v = value;
                return true;
            }
        }
        false
    }

    fn iter<'a>(&'a self) -> impl Iterator<Item = (&'a K, &'a V)>
    where
        K: 'a,
        V: 'a,
    {
        self.0
            .iter()
            .flat_map(|(k, bucket)| bucket.iter().map(move |v| (k, v)))
    }

    fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

#[derive(Debug, Clone)]
pub struct HashUniqueMap<K, V>(hashbrown::HashMap<K, V>);

impl<K, V> Default for HashUniqueMap<K, V> {
    fn default() -> Self {
        Self(hashbrown::HashMap::new())
    }
}

impl<K: IndexKey, V: RefValue> IndexMap<K, V> for HashUniqueMap<K, V> {
    const UNIQUE: bool = true;

    fn insert(&mut self, key: K, value: V) -> bool {
        match self.0.entry(key) {
            hashbrown::hash_map::Entry::Occupied(_) => false,
            hashbrown::hash_map::Entry::Vacant(e) => {
                e.insert(value);
                true
            }
        }
    }

    fn get_first(&self, key: &K) -> Option<&V> {
        self.0.get(key)
    }

    fn for_key<'a>(&'a self, key: &'a K) -> impl Iterator<Item = &'a V> + 'a
    where
        V: 'a,
    {
        self.0.get(key).into_iter()
    }

    fn remove_first(&mut self, key: &K, mut pred: impl FnMut(&V) -> bool) -> Option<V> {
        if pred(self.0.get(key)?) {
            self.0.remove(key)
        } else {
            None
        }
    }

    fn replace_first(&mut self, key: &K, mut pred: impl FnMut(&V) -> bool, value: V) -> bool {
        match self.0.get_mut(key) {
            Some(v) if pred(v) => {
                *v = value;
                true
            }
            _ => false,
        }
    }

    fn iter<'a>(&'a self) -> impl Iterator<Item = (&'a K, &'a V)>
    where
        K: 'a,
        V: 'a,
    {
        self.0.iter()
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn clear(&mut self) {
        self.0.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.0.reserve(additional);
    }
}

#[derive(Debug, Clone)]
pub struct HashMultiMap<K, V>(hashbrown::HashMap<K, Vec<V>>);

impl<K, V> Default for HashMultiMap<K, V> {
    fn default() -> Self {
        Self(hashbrown::HashMap::new())
    }
}

impl<K: IndexKey, V: RefValue> IndexMap<K, V> for HashMultiMap<K, V> {
    const UNIQUE: bool = false;

    fn insert(&mut self, key: K, value: V) -> bool {
        self.0.entry(key).or_default().push(value);
        true
    }

    fn get_first(&self, key: &K) -> Option<&V> {
        self.0.get(key).and_then(|bucket| bucket.first())
    }

    fn for_key<'a>(&'a self, key: &'a K) -> impl Iterator<Item = &'a V> + 'a
    where
        V: 'a,
    {
        self.0.get(key).into_iter().flatten()
    }

    fn remove_first(&mut self, key: &K, pred: impl FnMut(&V) -> bool) -> Option<V> {
        let bucket = self.0.get_mut(key)?;
        let i = bucket.iter().position(pred)?;
        let v = bucket.remove(i);
        if bucket.is_empty() {
            self.0.remove(key);
        }
        Some(v)
    }

    fn replace_first(&mut self, key: &K, mut pred: impl FnMut(&V) -> bool, value: V) -> bool {
        let Some(bucket) = self.0.get_mut(key) else {
            return false;
        };
        for v in bucket.iter_mut() {
            if pred(v) {
                *v = value;
                return true;
            }
        }
        false
    }

    fn iter<'a>(&'a self) -> impl Iterator<Item = (&'a K, &'a V)>
    where
        K: 'a,
        V: 'a,
    {
        self.0
            .iter()
            .flat_map(|(k, bucket)| bucket.iter().map(move |v| (k, v)))
    }

    fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    fn clear(&mut self) {
        self.0.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.0.reserve(additional);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invariant: duplicate keys are rejected and the map is unchanged.
    #[test]
    fn unique_rejects_duplicates() {
        let mut m: BTreeUniqueMap<String, u32> = BTreeUniqueMap::default();
        assert!(m.insert("dup".to_string(), 1));
        assert!(!m.insert("dup".to_string(), 2));
        assert_eq!(m.get_first(&"dup".to_string()), Some(&1));
        assert_eq!(m.len(), 1);
    }

    /// Invariant: multi buckets preserve insertion order, and
    /// `remove_first` removes exactly the first matching entry.
    #[test]
    fn multi_bucket_order_is_insertion_order() {
        let mut m: BTreeMultiMap<u32, u32> = BTreeMultiMap::default();
        for v in [10, 20, 30] {
            assert!(m.insert(1, v));
        }
        let seen: Vec<u32> = m.for_key(&1).copied().collect();
        assert_eq!(seen, vec![10, 20, 30]);

        let removed = m.remove_first(&1, |v| *v >= 20);
        assert_eq!(removed, Some(20));
        let seen: Vec<u32> = m.for_key(&1).copied().collect();
        assert_eq!(seen, vec![10, 30]);
        assert_eq!(m.key_count(&1), 2);
    }

    /// Invariant: draining a bucket removes the key entirely.
    #[test]
    fn multi_empty_bucket_is_dropped() {
        let mut m: HashMultiMap<u32, u32> = HashMultiMap::default();
        m.insert(7, 1);
        assert_eq!(m.remove_first(&7, |_| true), Some(1));
        assert!(!m.contains(&7));
        assert_eq!(m.len(), 0);
    }

    /// Invariant: `replace_first` rewrites the matching entry in place.
    #[test]
    fn replace_first_targets_matching_entry() {
        let mut m: HashMultiMap<u32, u32> = HashMultiMap::default();
        m.insert(1, 10);
        m.insert(1, 20);
        assert!(m.replace_first(&1, |v| *v == 20, 99));
        let mut seen: Vec<u32> = m.for_key(&1).copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![10, 99]);
        assert!(!m.replace_first(&1, |v| *v == 20, 0));
    }

    /// Invariant: flat iteration visits each entry once across buckets.
    #[test]
    fn multi_iter_is_flat() {
        let mut m: BTreeMultiMap<u32, u32> = BTreeMultiMap::default();
        m.insert(1, 10);
        m.insert(2, 20);
        m.insert(1, 11);
        let pairs: Vec<(u32, u32)> = m.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(pairs, vec![(1, 10), (1, 11), (2, 20)]);
        assert_eq!(m.len(), 3);
    }
}
