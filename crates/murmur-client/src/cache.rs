//! Fixed-capacity, recency-ordered map.

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::{trace, warn};

/// A map that keeps at most `capacity` entries and evicts the least
/// recently used one when a new key would exceed the bound.
///
/// Both `get` hits and `put` count as a use. Owned by the session loop;
/// callers on other threads must wrap it in a mutex.
pub struct BoundedCache<K: Hash + Eq, V> {
    name: &'static str,
    entries: LruCache<K, V>,
}

impl<K: Hash + Eq, V> BoundedCache<K, V> {
    /// A capacity of zero is clamped to one.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or_else(|| {
            warn!(cache = name, "Cache capacity 0 requested, using 1");
            NonZeroUsize::MIN
        });
        Self {
            name,
            entries: LruCache::new(capacity),
        }
    }

    /// Look up `key` and promote it to most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Look up `key` without touching its recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.peek(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Insert or refresh `key`. Returns the entry evicted to make room, if
    /// any, so the caller can release resources held by the value.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.entries.contains(&key) {
            self.entries.put(key, value);
            return None;
        }
        let evicted = self.entries.push(key, value);
        if evicted.is_some() {
            trace!(cache = self.name, "Evicted least recently used entry");
        }
        evicted
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }
}
