//! Separate-chaining hash map built from [`Array`] and [`SList`].
//!
//! Buckets are `SList`s indexed by `hash(key) % bucket_count`; the bucket
//! count is never zero. Both the hasher and the bucket-growth policy are
//! type parameters. Rehashing relinks list nodes into the new bucket table,
//! so elements are never moved or copied by a resize.

use crate::array::Array;
use crate::error::{Error, Result};
use crate::reserve::{PrimeReserve, ReserveStrategy};
use crate::slist::SList;
use fxhash::FxHasher;
use std::borrow::Borrow;
use std::fmt::{self, Debug};
use std::hash::{BuildHasher, BuildHasherDefault, Hash, Hasher};
use std::iter::FromIterator;
use std::mem;
use std::ops::Index;
use tracing::trace;

/// Key to value map. `H` supplies hashers, `R` picks bucket counts; the
/// strategy is consulted before every insertion and its result is clamped
/// to at least one bucket.
pub struct HashMap<K, V, H = BuildHasherDefault<FxHasher>, R = PrimeReserve>
where
    R: ReserveStrategy,
{
    buckets: Array<SList<(K, V)>>,
    size: usize,
    hasher: H,
    strategy: R,
}

impl<K, V, H, R> HashMap<K, V, H, R>
where
    K: Eq + Hash,
    H: BuildHasher,
    R: ReserveStrategy,
{
    pub fn new() -> Self
    where
        H: Default,
        R: Default,
    {
        Self::with_buckets(1)
    }

    pub fn with_buckets(buckets: usize) -> Self
    where
        H: Default,
        R: Default,
    {
        Self::with_buckets_and_parts(buckets, H::default(), R::default())
    }

    pub fn with_buckets_and_parts(buckets: usize, hasher: H, strategy: R) -> Self {
        HashMap {
            buckets: Array::filled_with(buckets.max(1), SList::new),
            size: 0,
            hasher,
            strategy,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).map(|(_, v)| v)
    }

    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.bucket_index(key);
        self.buckets[index]
            .iter()
            .find(|(k, _)| k.borrow() == key)
            .map(|(k, v)| (k, v))
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.bucket_index(key);
        self.buckets[index]
            .iter_mut()
            .find(|(k, _)| k.borrow() == key)
            .map(|(_, v)| v)
    }

    pub fn at<Q>(&self, key: &Q) -> Result<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).ok_or(Error::MissingKey)
    }

    pub fn at_mut<Q>(&mut self, key: &Q) -> Result<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_mut(key).ok_or(Error::MissingKey)
    }

    /// Inserts `(key, value)` unless the key is already present, in which
    /// case nothing changes. Returns the value slot and whether an insert
    /// happened.
    pub fn insert(&mut self, key: K, value: V) -> (&mut V, bool) {
        self.reserve_for_insert();
        let index = self.bucket_index(&key);
        let bucket = &mut self.buckets[index];
        if bucket.iter().any(|(k, _)| *k == key) {
            let pair = bucket.iter_mut().find(|(k, _)| *k == key).unwrap();
            (&mut pair.1, false)
        } else {
            bucket.push_front((key, value));
            self.size += 1;
            (&mut bucket.front_mut().unwrap().1, true)
        }
    }

    /// Unconditionally stores `value` at `key`, returning any displaced value.
    pub fn replace(&mut self, key: K, value: V) -> Option<V> {
        self.reserve_for_insert();
        let index = self.bucket_index(&key);
        let bucket = &mut self.buckets[index];
        if bucket.iter().any(|(k, _)| *k == key) {
            let pair = bucket.iter_mut().find(|(k, _)| *k == key).unwrap();
            Some(mem::replace(&mut pair.1, value))
        } else {
            bucket.push_front((key, value));
            self.size += 1;
            None
        }
    }

    /// Constructs the value in place only when the key is absent.
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        self.reserve_for_insert();
        let index = self.bucket_index(&key);
        let bucket = &mut self.buckets[index];
        if bucket.iter().any(|(k, _)| *k == key) {
            let pair = bucket.iter_mut().find(|(k, _)| *k == key).unwrap();
            &mut pair.1
        } else {
            bucket.push_front((key, make()));
            self.size += 1;
            &mut bucket.front_mut().unwrap().1
        }
    }

    pub fn get_or_insert_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        self.get_or_insert_with(key, V::default)
    }

    /// Removes the entry for `key` by unlinking its node from the chain.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.bucket_index(key);
        let mut cursor = self.buckets[index].find_prev_if(|(k, _)| k.borrow() == key)?;
        let (_, value) = cursor.remove_after().unwrap();
        self.size -= 1;
        Some(value)
    }

    /// Keeps only the entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) {
        for bucket in self.buckets.iter_mut() {
            self.size -= bucket.remove_all_if(|(k, v)| !keep(k, v));
        }
    }

    /// Removes every entry. The bucket count is kept.
    pub fn clear(&mut self) {
        for bucket in self.buckets.iter_mut() {
            bucket.clear();
        }
        self.size = 0;
    }

    /// Rehashes into `buckets` buckets (at least one). Nodes are spliced,
    /// never copied.
    pub fn resize(&mut self, buckets: usize) {
        let count = buckets.max(1);
        if count == self.buckets.len() {
            return;
        }
        trace!(buckets = count, size = self.size, "rehashing");
        let old = mem::replace(&mut self.buckets, Array::filled_with(count, SList::new));
        for mut bucket in old {
            while let Some(node) = bucket.pop_front_node() {
                let index = {
                    let (key, _) = unsafe { &(*node.as_ptr()).value };
                    self.bucket_index(key)
                };
                self.buckets[index].push_front_node(node);
            }
        }
    }

    /// Splices every entry of `other` whose key is absent here into `self`.
    /// Entries with duplicate keys stay in `other`.
    pub fn merge(&mut self, other: &mut Self) {
        for i in 0..other.buckets.len() {
            let mut taken = mem::take(&mut other.buckets[i]);
            while let Some(node) = taken.pop_front_node() {
                let duplicate = {
                    let (key, _) = unsafe { &(*node.as_ptr()).value };
                    self.contains_key(key)
                };
                if duplicate {
                    other.buckets[i].push_back_node(node);
                } else {
                    other.size -= 1;
                    self.reserve_for_insert();
                    let index = {
                        let (key, _) = unsafe { &(*node.as_ptr()).value };
                        self.bucket_index(key)
                    };
                    self.buckets[index].push_front_node(node);
                    self.size += 1;
                }
            }
        }
    }

    /// A new map with keys and values swapped. Duplicate values are not
    /// detected; the last one visited wins.
    pub fn invert(self) -> HashMap<V, K, H, R>
    where
        V: Eq + Hash,
        H: Default,
        R: Default,
    {
        let mut inverted = HashMap::new();
        for (key, value) in self {
            inverted.replace(value, key);
        }
        inverted
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            buckets: self.buckets.iter(),
            chain: None,
            remaining: self.size,
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            remaining: self.size,
            buckets: self.buckets.iter_mut(),
            chain: None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.iter_mut().map(|(_, v)| v)
    }

    fn bucket_index<Q>(&self, key: &Q) -> usize
    where
        Q: Hash + ?Sized,
    {
        let mut state = self.hasher.build_hasher();
        key.hash(&mut state);
        (state.finish() as usize) % self.buckets.len()
    }

    /// Consults the reserve strategy ahead of an insertion.
    fn reserve_for_insert(&mut self) {
        if self.size + 1 > self.buckets.len() {
            let proposal = self.strategy.reserve(self.size + 1, self.buckets.len());
            self.resize(proposal);
        }
    }
}

impl<K, V, H, R> Default for HashMap<K, V, H, R>
where
    K: Eq + Hash,
    H: BuildHasher + Default,
    R: ReserveStrategy + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, H, R> Clone for HashMap<K, V, H, R>
where
    K: Eq + Hash + Clone,
    V: Clone,
    H: BuildHasher + Clone,
    R: ReserveStrategy + Clone,
{
    fn clone(&self) -> Self {
        let mut map = Self::with_buckets_and_parts(
            self.bucket_count(),
            self.hasher.clone(),
            self.strategy.clone(),
        );
        for (key, value) in self.iter() {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}

impl<K, V, H, R> Debug for HashMap<K, V, H, R>
where
    K: Eq + Hash + Debug,
    V: Debug,
    H: BuildHasher,
    R: ReserveStrategy,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Order-independent: two maps are equal when they hold the same entries,
/// regardless of bucket count or insertion order.
impl<K, V, H, R, H2, R2> PartialEq<HashMap<K, V, H2, R2>> for HashMap<K, V, H, R>
where
    K: Eq + Hash,
    V: PartialEq,
    H: BuildHasher,
    H2: BuildHasher,
    R: ReserveStrategy,
    R2: ReserveStrategy,
{
    fn eq(&self, other: &HashMap<K, V, H2, R2>) -> bool {
        self.size == other.size
            && self
                .iter()
                .all(|(key, value)| other.get(key).map_or(false, |v| v == value))
    }
}

impl<K, V, H, R> Eq for HashMap<K, V, H, R>
where
    K: Eq + Hash,
    V: Eq,
    H: BuildHasher,
    R: ReserveStrategy,
{
}

impl<K, V, H, R, Q> Index<&Q> for HashMap<K, V, H, R>
where
    K: Eq + Hash + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    H: BuildHasher,
    R: ReserveStrategy,
{
    type Output = V;

    fn index(&self, key: &Q) -> &V {
        self.at(key).unwrap_or_else(|e| panic!("{}", e))
    }
}

impl<K, V, H, R> Extend<(K, V)> for HashMap<K, V, H, R>
where
    K: Eq + Hash,
    H: BuildHasher,
    R: ReserveStrategy,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V, H, R> FromIterator<(K, V)> for HashMap<K, V, H, R>
where
    K: Eq + Hash,
    H: BuildHasher + Default,
    R: ReserveStrategy + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

pub struct Iter<'a, K, V> {
    buckets: std::slice::Iter<'a, SList<(K, V)>>,
    chain: Option<crate::slist::Iter<'a, (K, V)>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(chain) = &mut self.chain {
                if let Some((key, value)) = chain.next() {
                    self.remaining -= 1;
                    return Some((key, value));
                }
            }
            // advance past empty buckets
            self.chain = Some(self.buckets.next()?.iter());
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

pub struct IterMut<'a, K, V> {
    buckets: std::slice::IterMut<'a, SList<(K, V)>>,
    chain: Option<crate::slist::IterMut<'a, (K, V)>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(chain) = &mut self.chain {
                if let Some((key, value)) = chain.next() {
                    self.remaining -= 1;
                    return Some((&*key, value));
                }
            }
            self.chain = Some(self.buckets.next()?.iter_mut());
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

pub struct IntoIter<K, V> {
    buckets: crate::array::IntoIter<SList<(K, V)>>,
    chain: Option<crate::slist::IntoIter<(K, V)>>,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        loop {
            if let Some(chain) = &mut self.chain {
                if let Some(pair) = chain.next() {
                    return Some(pair);
                }
            }
            self.chain = Some(self.buckets.next()?.into_iter());
        }
    }
}

impl<'a, K, V, H, R> IntoIterator for &'a HashMap<K, V, H, R>
where
    K: Eq + Hash,
    H: BuildHasher,
    R: ReserveStrategy,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, H, R> IntoIterator for HashMap<K, V, H, R>
where
    K: Eq + Hash,
    H: BuildHasher,
    R: ReserveStrategy,
{
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(mut self) -> Self::IntoIter {
        let buckets = mem::replace(&mut self.buckets, Array::filled_with(1, SList::new));
        self.size = 0;
        IntoIter {
            buckets: buckets.into_iter(),
            chain: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Map = HashMap<String, i32>;

    fn map_of(pairs: &[(&str, i32)]) -> Map {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn fresh_map_grows_to_next_prime() {
        let mut map = Map::new();
        for i in 0..10 {
            map.insert(format!("key{}", i), i);
        }
        assert_eq!(11, map.bucket_count());
        assert_eq!(10, map.len());
        for i in 0..10 {
            assert_eq!(Some(&i), map.get(format!("key{}", i).as_str()));
        }
    }

    #[test]
    fn insert_is_noop_on_duplicate() {
        let mut map = Map::new();
        let (_, inserted) = map.insert("a".to_string(), 1);
        assert!(inserted);
        let (value, inserted) = map.insert("a".to_string(), 2);
        assert!(!inserted);
        assert_eq!(1, *value);
        assert_eq!(1, map.len());
    }

    #[test]
    fn replace_overwrites() {
        let mut map = Map::new();
        assert_eq!(None, map.replace("a".to_string(), 1));
        assert_eq!(Some(1), map.replace("a".to_string(), 2));
        assert_eq!(Some(&2), map.get("a"));
    }

    #[test]
    fn get_or_insert_with_constructs_once() {
        let mut map = Map::new();
        let mut calls = 0;
        *map.get_or_insert_with("a".to_string(), || {
            calls += 1;
            7
        }) += 1;
        map.get_or_insert_with("a".to_string(), || {
            calls += 1;
            0
        });
        assert_eq!(1, calls);
        assert_eq!(Some(&8), map.get("a"));
    }

    #[test]
    fn keys_stay_unique_across_rehash() {
        let mut map = map_of(&[("a", 1), ("b", 2), ("c", 3)]);
        map.resize(97);
        assert_eq!(97, map.bucket_count());
        assert_eq!(3, map.len());
        assert_eq!(Some(&2), map.get("b"));
        assert_eq!(1, map.iter().filter(|(k, _)| k.as_str() == "b").count());
        map.resize(0);
        assert_eq!(1, map.bucket_count());
        assert_eq!(Some(&3), map.get("c"));
    }

    #[test]
    fn equality_is_order_and_bucket_independent() {
        let forward = map_of(&[("a", 1), ("b", 2), ("c", 3)]);
        let mut backward = map_of(&[("c", 3), ("b", 2), ("a", 1)]);
        backward.resize(53);
        assert_eq!(forward, backward);

        let different = map_of(&[("a", 1), ("b", 2), ("c", 4)]);
        assert_ne!(forward, different);
    }

    #[test]
    fn remove_unlinks() {
        let mut map = map_of(&[("a", 1), ("b", 2)]);
        assert_eq!(Some(1), map.remove("a"));
        assert_eq!(None, map.remove("a"));
        assert_eq!(1, map.len());
        assert!(!map.contains_key("a"));
    }

    #[test]
    fn retain_filters() {
        let mut map = map_of(&[("a", 1), ("b", 2), ("c", 3), ("d", 4)]);
        map.retain(|_, v| v % 2 == 0);
        assert_eq!(map_of(&[("b", 2), ("d", 4)]), map);
    }

    #[test]
    fn clear_keeps_buckets() {
        let mut map = map_of(&[("a", 1), ("b", 2), ("c", 3)]);
        let buckets = map.bucket_count();
        map.clear();
        assert!(map.is_empty());
        assert_eq!(buckets, map.bucket_count());
    }

    #[test]
    fn merge_moves_only_absent_keys() {
        let mut target = map_of(&[("a", 1), ("b", 2)]);
        let mut donor = map_of(&[("b", 20), ("c", 30)]);
        target.merge(&mut donor);

        assert_eq!(map_of(&[("a", 1), ("b", 2), ("c", 30)]), target);
        assert_eq!(map_of(&[("b", 20)]), donor);
    }

    #[test]
    fn invert_keeps_last_on_collision() {
        let map = map_of(&[("a", 1), ("b", 2)]);
        let inverted = map.invert();
        assert_eq!(Some(&"a".to_string()), inverted.get(&1));
        assert_eq!(Some(&"b".to_string()), inverted.get(&2));

        let colliding = map_of(&[("a", 1), ("b", 1)]);
        let inverted = colliding.invert();
        assert_eq!(1, inverted.len());
        assert!(inverted.contains_key(&1));
    }

    #[test]
    fn iteration_covers_every_entry() {
        let mut map = Map::new();
        for i in 0..50 {
            map.insert(format!("k{}", i), i);
        }
        assert_eq!(50, map.iter().count());
        assert_eq!((0..50).sum::<i32>(), map.values().sum::<i32>());

        for (_, value) in map.iter_mut() {
            *value += 1;
        }
        assert_eq!((1..51).sum::<i32>(), map.into_iter().map(|(_, v)| v).sum());
    }

    #[test]
    fn at_reports_missing_keys() {
        let map = map_of(&[("a", 1)]);
        assert_eq!(Ok(&1), map.at("a"));
        assert_eq!(Err(Error::MissingKey), map.at("zzz"));
    }

    #[test]
    #[should_panic(expected = "key not present")]
    fn index_panics_on_missing() {
        let map = map_of(&[("a", 1)]);
        let _ = map["nope"];
    }

    #[test]
    fn clone_preserves_entries_and_buckets() {
        let mut map = Map::new();
        for i in 0..20 {
            map.insert(format!("k{}", i), i);
        }
        let copy = map.clone();
        assert_eq!(map, copy);
        assert_eq!(map.bucket_count(), copy.bucket_count());
    }
}
