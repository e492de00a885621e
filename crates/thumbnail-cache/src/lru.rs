//! Thread-safe fixed-capacity LRU cache
//!
//! Entries live in an arena (`Vec` of nodes) and are chained into a doubly
//! linked recency list through slot indices, with a `HashMap` from key to slot.
//! `get`, `put` and `remove` are all O(1). The map and the list are guarded by
//! a single mutex, so no caller can observe one without the other.

use crate::error::{positive, ConfigError};
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// A thread-safe LRU cache holding at most `capacity` entries
///
/// Values are handed out by clone; store an `Arc` to share large values.
pub struct LruCache<K, V> {
    inner: Mutex<LruCacheInner<K, V>>,
}

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

struct LruCacheInner<K, V> {
    index: HashMap<K, usize>,
    nodes: Vec<Node<K, V>>,
    /// Most recently used
    head: Option<usize>,
    /// Least recently used
    tail: Option<usize>,
    capacity: usize,
    evictions: u64,
}

impl<K: Clone + Hash + Eq, V: Clone> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries; `capacity` must be at least 1
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::NotPositive {
                field: "cache_capacity",
                value: 0,
            });
        }
        Ok(Self {
            inner: Mutex::new(LruCacheInner {
                index: HashMap::with_capacity(capacity.min(4096)),
                nodes: Vec::with_capacity(capacity.min(4096)),
                head: None,
                tail: None,
                capacity,
                evictions: 0,
            }),
        })
    }

    /// Create a cache from an externally supplied, possibly invalid, capacity
    pub fn with_capacity(capacity: i64) -> Result<Self, ConfigError> {
        Self::new(positive("cache_capacity", capacity)?)
    }

    /// Get a value, promoting it to most recently used
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().get(key)
    }

    /// Insert or replace a value as most recently used.
    ///
    /// Returns the entry evicted to make room, if any. Replacing an existing
    /// key never evicts.
    pub fn put(&self, key: K, value: V) -> Option<(K, V)> {
        self.inner.lock().put(key, value)
    }

    /// Remove an entry regardless of its position
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().remove(key)
    }

    /// Check for a key without touching its recency
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().index.contains_key(key)
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Vec<K> {
        let inner = self.inner.lock();
        let mut keys = Vec::with_capacity(inner.nodes.len());
        let mut cursor = inner.head;
        while let Some(slot) = cursor {
            keys.push(inner.nodes[slot].key.clone());
            cursor = inner.nodes[slot].next;
        }
        keys
    }

    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Number of entries evicted for capacity since creation
    pub fn evictions(&self) -> u64 {
        self.inner.lock().evictions
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl<K: Clone + Hash + Eq, V: Clone> LruCacheInner<K, V> {
    fn get<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = *self.index.get(key)?;
        self.promote(slot);
        Some(self.nodes[slot].value.clone())
    }

    fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&slot) = self.index.get(&key) {
            self.nodes[slot].value = value;
            self.promote(slot);
            return None;
        }

        let fresh = Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };

        if self.index.len() < self.capacity {
            let slot = self.nodes.len();
            self.nodes.push(fresh);
            self.push_front(slot);
            self.index.insert(key, slot);
            return None;
        }

        // Full: the tail's slot is recycled for the new entry
        let slot = self.tail?;
        self.unlink(slot);
        let evicted = std::mem::replace(&mut self.nodes[slot], fresh);
        self.index.remove(&evicted.key);
        self.push_front(slot);
        self.index.insert(key, slot);
        self.evictions += 1;
        Some((evicted.key, evicted.value))
    }

    fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.index.remove(key)?;
        self.unlink(slot);
        let removed = self.nodes.swap_remove(slot);

        // The former last node now sits in `slot`; repoint its neighbours
        if slot < self.nodes.len() {
            let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
            match prev {
                Some(p) => self.nodes[p].next = Some(slot),
                None => self.head = Some(slot),
            }
            match next {
                Some(n) => self.nodes[n].prev = Some(slot),
                None => self.tail = Some(slot),
            }
            if let Some(moved) = self.index.get_mut::<K>(&self.nodes[slot].key) {
                *moved = slot;
            }
        }

        Some(removed.value)
    }

    /// Move a linked node to the head
    fn promote(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.push_front(slot);
    }

    /// Detach a node from the list, fixing head and tail
    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[slot].prev = None;
        self.nodes[slot].next = None;
    }

    /// Link a detached node in as the head
    fn push_front(&mut self, slot: usize) {
        self.nodes[slot].prev = None;
        self.nodes[slot].next = self.head;
        match self.head {
            Some(h) => self.nodes[h].prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    fn clear(&mut self) {
        self.index.clear();
        self.nodes.clear();
        self.head = None;
        self.tail = None;
    }
}

impl<K, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LruCache")
            .field("len", &inner.index.len())
            .field("capacity", &inner.capacity)
            .field("evictions", &inner.evictions)
            .finish()
    }
}
