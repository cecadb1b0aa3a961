//! Local Async Cache Module
//!
//! Thread-safe, bounded in-memory [`TypedCache`] with TTL expiry, LRU
//! eviction and compare-and-set updates. Every operation resolves against
//! the in-memory store right away; the lock is never held across an await.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{CacheLoader, CacheStats, CacheStore, EntryMapper, TypedCache};
use crate::config::CacheConfig;
use crate::error::Result;

// == Local Async Cache ==
/// Bounded, TTL-based local cache.
pub struct LocalAsyncCache<K, V> {
    name: String,
    store: Mutex<CacheStore<K, V>>,
    loader: Option<Arc<dyn CacheLoader<K, V>>>,
}

impl<K, V> LocalAsyncCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a cache holding at most `max_entries` values for `ttl` each.
    ///
    /// # Arguments
    /// * `name` - Label used in logs and passed to loaders by higher layers
    /// * `max_entries` - Size bound, enforced by LRU eviction
    /// * `ttl` - Age after which an entry reads as absent
    pub fn new(name: impl Into<String>, max_entries: usize, ttl: Duration) -> Self {
        let name = name.into();
        debug!(
            cache = %name,
            max_entries,
            ttl_ms = ttl.as_millis() as u64,
            "local cache created"
        );

        Self {
            name,
            store: Mutex::new(CacheStore::new(max_entries, ttl)),
            loader: None,
        }
    }

    /// Creates a cache sized and named by `config`.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.cache_name.clone(), config.max_entries, config.ttl)
    }

    /// Attaches a loader for use by layers built on top of this cache.
    ///
    /// The local cache itself never calls it; see
    /// [`LoadingCacheDelegate`](crate::loading::LoadingCacheDelegate).
    pub fn with_loader(mut self, loader: Arc<dyn CacheLoader<K, V>>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn loader(&self) -> Option<&Arc<dyn CacheLoader<K, V>>> {
        self.loader.as_ref()
    }

    // == Set If Absent ==
    /// Stores the pair only if no live value exists for the key.
    pub async fn set_if_absent_async(&self, key: K, value: V) -> Result<bool> {
        Ok(self.store.lock().set_if_absent(key, value))
    }

    // == Compare And Set ==
    /// Atomically replaces the value iff the current one equals `expected`.
    ///
    /// `expected == None` matches an absent key. Returns false, with no
    /// mutation, when the stored value differs.
    pub async fn compare_and_set_async(
        &self,
        key: K,
        expected: Option<V>,
        new_value: V,
    ) -> Result<bool>
    where
        V: PartialEq,
    {
        Ok(self
            .store
            .lock()
            .compare_and_set(key, expected.as_ref(), new_value))
    }

    // == Cleanup Expired ==
    /// Drops every expired entry now. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        self.store.lock().cleanup_expired()
    }

    pub fn stats(&self) -> CacheStats {
        self.store.lock().stats()
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }
}

#[async_trait]
impl<K, V> TypedCache<K, V> for LocalAsyncCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get_async(&self, key: &K) -> Result<Option<V>> {
        Ok(self.store.lock().get(key))
    }

    async fn get_bulk_async(&self, keys: &[K]) -> Result<HashMap<K, V>> {
        let mut store = self.store.lock();
        Ok(keys
            .iter()
            .filter_map(|key| store.get(key).map(|value| (key.clone(), value)))
            .collect())
    }

    async fn set_async(&self, key: K, value: V) -> Result<bool> {
        self.store.lock().set(key, value);
        Ok(true)
    }

    // Maps outside the lock, then stores only if the entry version is unchanged.
    async fn set_with_mapper_async(
        &self,
        key: K,
        mapper: &dyn EntryMapper<K, V>,
        max_iterations: usize,
    ) -> Result<bool> {
        for _ in 0..max_iterations {
            let current = self
                .store
                .lock()
                .peek_versioned(&key)
                .map(|(value, version)| (value.clone(), version));
            let Some(new_value) = mapper.map(&key, current.as_ref().map(|(value, _)| value)) else {
                return Ok(false);
            };

            let expected = current.map(|(_, version)| version);
            if self.store.lock().set_if_version(key.clone(), expected, new_value) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn delete_async(&self, key: &K) -> Result<bool> {
        Ok(self.store.lock().delete(key))
    }
}

impl<K, V> fmt::Debug for LocalAsyncCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAsyncCache")
            .field("name", &self.name)
            .field("has_loader", &self.loader.is_some())
            .finish_non_exhaustive()
    }
}
