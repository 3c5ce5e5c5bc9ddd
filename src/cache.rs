//! Memoisation of abstract operator results.
//!
//! Domain values are small `Copy` types with structural equality, so operator
//! results can be keyed directly by their operands. The cache is bounded: once it
//! holds `capacity` entries, it is cleared before the next insertion.

use std::cell::Cell;
use std::collections::HashMap;
use std::hash::Hash;

use log::debug;

use crate::expr::Op;

/// Key of a memoised operator application.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OpKey<D> {
    Unary(Op, D),
    Binary(Op, D, D),
}

/// A bounded result cache with hit/miss statistics.
pub struct OpCache<K, V> {
    map: HashMap<K, V>,
    capacity: usize,
    hits: Cell<usize>,
    misses: Cell<usize>,
    evictions: usize,
}

impl<K, V> OpCache<K, V> {
    /// Create a cache holding at most `capacity` entries.
    ///
    /// A capacity of zero disables the cache: nothing is ever stored.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity.min(1 << 16)),
            capacity,
            hits: Cell::new(0),
            misses: Cell::new(0),
            evictions: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the number of cache hits.
    pub fn hits(&self) -> usize {
        self.hits.get()
    }

    /// Returns the number of cache misses.
    pub fn misses(&self) -> usize {
        self.misses.get()
    }

    /// Number of times the cache was full and got cleared.
    pub fn evictions(&self) -> usize {
        self.evictions
    }

    /// Clears all entries; the statistics are kept.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl<K, V> OpCache<K, V>
where
    K: Hash + Eq,
    V: Copy,
{
    /// Looks up a key in the cache.
    pub fn get(&self, key: &K) -> Option<V> {
        match self.map.get(key) {
            Some(&v) => {
                self.hits.set(self.hits.get() + 1);
                Some(v)
            }
            None => {
                self.misses.set(self.misses.get() + 1);
                None
            }
        }
    }

    /// Inserts a result, clearing the cache first if it is full.
    pub fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if self.map.len() >= self.capacity && !self.map.contains_key(&key) {
            debug!("cache full with {} entries, clearing", self.map.len());
            self.map.clear();
            self.evictions += 1;
        }
        self.map.insert(key, value);
    }

    /// The cached value for `key`, computing and storing it on a miss.
    pub fn get_or_insert_with(&mut self, key: K, f: impl FnOnce() -> V) -> V {
        if let Some(v) = self.get(&key) {
            return v;
        }
        let v = f();
        self.insert(key, v);
        v
    }
}
