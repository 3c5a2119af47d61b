//Copyright 2024 Felix Engl
//
//Licensed under the Apache License, Version 2.0 (the "License");
//you may not use this file except in compliance with the License.
//You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
//Unless required by applicable law or agreed to in writing, software
//distributed under the License is distributed on an "AS IS" BASIS,
//WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//See the License for the specific language governing permissions and
//limitations under the License.

use std::fmt::{Debug, Formatter};
use serde::{Deserialize, Serialize};

/// A sparse map from a small integer key (usually a topic id) to a value.
///
/// The entries are kept sorted by key, so iteration order is deterministic and
/// lookups are a binary search. Absent keys are implicitly zero. For counts the
/// map guarantees that no stored entry is zero, see [SparseTopicMap::decrement].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SparseTopicMap<V> {
    entries: Vec<(usize, V)>,
}

impl<V> Default for SparseTopicMap<V> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<V> SparseTopicMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry but keeps the allocation.
    pub fn clear(&mut self) {
        self.entries.clear()
    }

    #[inline]
    fn position(&self, key: usize) -> Result<usize, usize> {
        self.entries.binary_search_by_key(&key, |(k, _)| *k)
    }

    #[inline]
    pub fn contains_key(&self, key: usize) -> bool {
        self.position(key).is_ok()
    }

    /// Iterates over the keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item=usize> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    /// The entries sorted by key.
    #[inline]
    pub fn as_slice(&self) -> &[(usize, V)] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (usize, V)> {
        self.entries.iter()
    }

    pub fn remove(&mut self, key: usize) -> Option<V> {
        match self.position(key) {
            Ok(pos) => Some(self.entries.remove(pos).1),
            Err(_) => None
        }
    }
}

impl<V: Copy> SparseTopicMap<V> {
    #[inline]
    pub fn get(&self, key: usize) -> Option<V> {
        self.position(key).ok().map(|pos| self.entries[pos].1)
    }

    /// Sets `key` to `value`, returns the old value if there was one.
    pub fn insert(&mut self, key: usize, value: V) -> Option<V> {
        match self.position(key) {
            Ok(pos) => Some(std::mem::replace(&mut self.entries[pos].1, value)),
            Err(pos) => {
                self.entries.insert(pos, (key, value));
                None
            }
        }
    }
}

impl SparseTopicMap<u32> {
    /// Returns the count for `key`, zero if absent.
    #[inline]
    pub fn count(&self, key: usize) -> u32 {
        self.get(key).unwrap_or(0)
    }

    /// Adds one to the count of `key`, inserting it if necessary. Returns the new count.
    pub fn increment(&mut self, key: usize) -> u32 {
        match self.position(key) {
            Ok(pos) => {
                let value = &mut self.entries[pos].1;
                *value += 1;
                *value
            }
            Err(pos) => {
                self.entries.insert(pos, (key, 1));
                1
            }
        }
    }

    /// Subtracts one from the count of `key` and drops the entry when it reaches zero.
    /// Returns the new count or None if `key` was not present.
    pub fn decrement(&mut self, key: usize) -> Option<u32> {
        let pos = self.position(key).ok()?;
        let value = self.entries[pos].1;
        if value == 1 {
            self.entries.remove(pos);
            Some(0)
        } else {
            self.entries[pos].1 = value - 1;
            Some(value - 1)
        }
    }

    /// The sum of all counts.
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, v)| *v as u64).sum()
    }
}

impl<V> FromIterator<(usize, V)> for SparseTopicMap<V> where V: Copy + std::ops::AddAssign {
    fn from_iter<T: IntoIterator<Item=(usize, V)>>(iter: T) -> Self {
        let mut target = Self::new();
        for (key, value) in iter {
            match target.position(key) {
                Ok(pos) => target.entries[pos].1 += value,
                Err(pos) => target.entries.insert(pos, (key, value)),
            }
        }
        target
    }
}

impl<'a, V> IntoIterator for &'a SparseTopicMap<V> {
    type Item = &'a (usize, V);
    type IntoIter = std::slice::Iter<'a, (usize, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<V: Debug> Debug for SparseTopicMap<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.entries.iter().map(|(k, v)| (k, v))).finish()
    }
}

#[cfg(test)]
mod test {
    use super::SparseTopicMap;

    #[test]
    fn decrement_removes_the_entry_at_zero(){
        let mut map = SparseTopicMap::<u32>::new();
        map.increment(3);
        map.increment(1);
        map.increment(3);
        assert_eq!(vec![1, 3], map.keys().collect::<Vec<_>>());
        assert_eq!(Some(1), map.decrement(3));
        assert_eq!(Some(0), map.decrement(1));
        assert!(!map.contains_key(1));
        assert_eq!(None, map.decrement(7));
        assert_eq!(1, map.total());
        assert!(map.iter().all(|(_, v)| *v != 0));
    }

    #[test]
    fn collects_and_merges_duplicates(){
        let map: SparseTopicMap<u32> = vec![(4, 2), (0, 1), (4, 3)].into_iter().collect();
        assert_eq!(&[(0, 1), (4, 5)], map.as_slice());
    }

    #[test]
    fn serializes_as_a_plain_list(){
        let mut map = SparseTopicMap::<f64>::new();
        map.insert(2, 0.5);
        let ser = serde_json::to_string(&map).unwrap();
        assert_eq!("[[2,0.5]]", ser);
        let back: SparseTopicMap<f64> = serde_json::from_str(&ser).unwrap();
        assert_eq!(map, back);
    }
}
