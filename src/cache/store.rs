//! Cache Store Module
//!
//! Single-threaded cache engine combining HashMap storage with LRU tracking
//! and TTL expiration. [`LocalAsyncCache`](super::LocalAsyncCache) puts it
//! behind a lock.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use crate::cache::{CacheEntry, CacheStats, LruTracker};

// == Cache Store ==
/// Bounded key-value storage with LRU eviction and a fixed TTL.
#[derive(Debug)]
pub struct CacheStore<K, V> {
    /// Key-value storage
    entries: HashMap<K, CacheEntry<V>>,
    /// LRU access tracker
    lru: LruTracker<K>,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// Age after which an entry reads as absent
    ttl: Duration,
    /// Version handed to the next write
    next_version: u64,
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Creates a new CacheStore with specified capacity and TTL.
    ///
    /// # Arguments
    /// * `max_entries` - Maximum number of entries the cache can hold (at least 1)
    /// * `ttl` - Age after which an entry is treated as absent
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_entries: max_entries.max(1),
            ttl,
            next_version: 1,
        }
    }

    // == Get ==
    /// Retrieves a live value by key and marks it most recently used.
    ///
    /// Expired entries are removed and counted as misses.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let value = self.peek(key).cloned();
        match value {
            Some(value) => {
                self.stats.record_hit();
                self.lru.touch(key);
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Peek ==
    /// Returns the live value for `key` without touching recency or stats.
    ///
    /// An expired entry found on the way is dropped.
    pub fn peek(&mut self, key: &K) -> Option<&V> {
        let expired = self.entries.get(key)?.is_expired(self.ttl);
        if expired {
            self.remove_entry(key);
            self.stats.record_expirations(1);
            return None;
        }
        self.entries.get(key).map(|entry| &entry.value)
    }

    // == Peek Versioned ==
    /// Like [`peek`](Self::peek), also returning the version of the live entry.
    pub fn peek_versioned(&mut self, key: &K) -> Option<(&V, u64)> {
        self.peek(key)?;
        self.entries.get(key).map(|entry| (&entry.value, entry.version))
    }

    // == Set ==
    /// Stores a key-value pair unconditionally and restarts its TTL.
    ///
    /// If the key is new and the cache is at capacity, the least recently
    /// used entry is evicted first.
    pub fn set(&mut self, key: K, value: V) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            if let Some(evicted_key) = self.lru.evict_oldest() {
                self.entries.remove(&evicted_key);
                self.stats.record_eviction();
            }
        }

        let version = self.next_version;
        self.next_version += 1;

        self.lru.touch(&key);
        self.entries.insert(key, CacheEntry::new(value, version));
        self.stats.set_total_entries(self.entries.len());
    }

    // == Set If Absent ==
    /// Stores the pair only if no live value exists for the key.
    pub fn set_if_absent(&mut self, key: K, value: V) -> bool {
        if self.peek(&key).is_some() {
            return false;
        }
        self.set(key, value);
        true
    }

    // == Compare And Set ==
    /// Replaces the value for `key` with `new_value` iff the current live
    /// value equals `expected`, where `None` stands for "absent".
    ///
    /// Leaves the store untouched and returns false on mismatch.
    pub fn compare_and_set(&mut self, key: K, expected: Option<&V>, new_value: V) -> bool
    where
        V: PartialEq,
    {
        if self.peek(&key) != expected {
            return false;
        }
        self.set(key, new_value);
        true
    }

    // == Set If Version ==
    /// Stores `new_value` iff the live entry still carries `expected`, where
    /// `None` stands for "absent". Any write in between bumps the version.
    pub fn set_if_version(&mut self, key: K, expected: Option<u64>, new_value: V) -> bool {
        let current = self.peek_versioned(&key).map(|(_, version)| version);
        if current != expected {
            return false;
        }
        self.set(key, new_value);
        true
    }

    // == Delete ==
    /// Removes an entry by key. Returns true if a live entry was removed.
    pub fn delete(&mut self, key: &K) -> bool {
        let live = self.peek(key).is_some();
        if live {
            self.remove_entry(key);
        }
        live
    }

    fn remove_entry(&mut self, key: &K) {
        self.entries.remove(key);
        self.lru.remove(key);
        self.stats.set_total_entries(self.entries.len());
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let ttl = self.ttl;
        let expired_keys: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(ttl))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove_entry(key);
        }

        self.stats.record_expirations(expired_keys.len());
        expired_keys.len()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    /// Number of stored entries, expired ones included until they are touched or swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(300);

    fn store(max_entries: usize) -> CacheStore<String, String> {
        CacheStore::new(max_entries, TTL)
    }

    fn key(k: &str) -> String {
        k.to_string()
    }

    #[test]
    fn test_store_new() {
        let store = store(100);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_zero_capacity_is_clamped() {
        let mut store = store(0);
        store.set(key("key1"), key("value1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = store(100);

        store.set(key("key1"), key("value1"));

        assert_eq!(store.get(&key("key1")), Some(key("value1")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store = store(100);
        assert_eq!(store.get(&key("nonexistent")), None);
    }

    #[test]
    fn test_store_delete() {
        let mut store = store(100);

        store.set(key("key1"), key("value1"));

        assert!(store.delete(&key("key1")));
        assert!(store.is_empty());
        assert!(!store.delete(&key("key1")));
        assert_eq!(store.get(&key("key1")), None);
    }

    #[test]
    fn test_store_overwrite() {
        let mut store = store(100);

        store.set(key("key1"), key("value1"));
        store.set(key("key1"), key("value2"));

        assert_eq!(store.get(&key("key1")), Some(key("value2")));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_ttl_expiration() {
        let mut store: CacheStore<String, String> = CacheStore::new(100, Duration::from_millis(100));

        store.set(key("key1"), key("value1"));
        assert!(store.get(&key("key1")).is_some());

        tokio::time::advance(Duration::from_millis(100)).await;

        assert_eq!(store.get(&key("key1")), None);
        assert!(store.is_empty());
        assert_eq!(store.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_overwrite_restarts_ttl() {
        let mut store: CacheStore<String, String> = CacheStore::new(100, Duration::from_millis(100));

        store.set(key("key1"), key("value1"));
        tokio::time::advance(Duration::from_millis(60)).await;
        store.set(key("key1"), key("value2"));
        tokio::time::advance(Duration::from_millis(60)).await;

        assert_eq!(store.get(&key("key1")), Some(key("value2")));
    }

    #[test]
    fn test_store_lru_eviction() {
        let mut store = store(3);

        store.set(key("key1"), key("value1"));
        store.set(key("key2"), key("value2"));
        store.set(key("key3"), key("value3"));

        // Cache is full, adding key4 should evict key1 (oldest)
        store.set(key("key4"), key("value4"));

        assert_eq!(store.len(), 3);
        assert_eq!(store.get(&key("key1")), None);
        assert!(store.get(&key("key2")).is_some());
        assert!(store.get(&key("key3")).is_some());
        assert!(store.get(&key("key4")).is_some());
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_store_lru_touch_on_get() {
        let mut store = store(3);

        store.set(key("key1"), key("value1"));
        store.set(key("key2"), key("value2"));
        store.set(key("key3"), key("value3"));

        store.get(&key("key1"));

        // key2 is now the least recently used
        store.set(key("key4"), key("value4"));

        assert!(store.get(&key("key1")).is_some());
        assert_eq!(store.get(&key("key2")), None);
    }

    #[test]
    fn test_store_peek_does_not_touch() {
        let mut store = store(2);

        store.set(key("key1"), key("value1"));
        store.set(key("key2"), key("value2"));
        assert_eq!(store.peek(&key("key1")), Some(&key("value1")));

        store.set(key("key3"), key("value3"));

        assert_eq!(store.get(&key("key1")), None);
        assert_eq!(store.stats().hits, 0);
    }

    #[test]
    fn test_store_compare_and_set() {
        let mut store = store(100);

        assert!(store.compare_and_set(key("k"), None, key("v1")));
        assert!(!store.compare_and_set(key("k"), None, key("other")));
        assert!(store.compare_and_set(key("k"), Some(&key("v1")), key("v2")));
        assert!(!store.compare_and_set(key("k"), Some(&key("v1")), key("v3")));

        assert_eq!(store.get(&key("k")), Some(key("v2")));
    }

    #[test]
    fn test_store_set_if_version() {
        let mut store = store(100);

        assert!(store.set_if_version(key("k"), None, key("v1")));
        assert!(!store.set_if_version(key("k"), None, key("other")));

        let (_, seen) = store.peek_versioned(&key("k")).unwrap();
        store.set(key("k"), key("v1"));

        // Rewriting the same value still invalidates the version read earlier.
        assert!(!store.set_if_version(key("k"), Some(seen), key("v2")));

        let (value, latest) = store.peek_versioned(&key("k")).unwrap();
        assert_eq!(value, &key("v1"));
        assert!(latest > seen);
        assert!(store.set_if_version(key("k"), Some(latest), key("v2")));
        assert_eq!(store.get(&key("k")), Some(key("v2")));
    }

    #[test]
    fn test_store_set_if_absent() {
        let mut store = store(100);

        assert!(store.set_if_absent(key("k"), key("v1")));
        assert!(!store.set_if_absent(key("k"), key("v2")));
        assert_eq!(store.get(&key("k")), Some(key("v1")));
    }

    #[test]
    fn test_store_stats() {
        let mut store = store(100);

        store.set(key("key1"), key("value1"));
        store.get(&key("key1"));
        store.get(&key("nonexistent"));

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_cleanup_expired() {
        let mut store: CacheStore<String, String> = CacheStore::new(100, Duration::from_millis(100));

        store.set(key("key1"), key("value1"));
        tokio::time::advance(Duration::from_millis(50)).await;
        store.set(key("key2"), key("value2"));
        tokio::time::advance(Duration::from_millis(60)).await;

        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(&key("key2")).is_some());
    }
}
