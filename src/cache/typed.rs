//! The asynchronous cache contract shared by every backend.

use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;

use crate::concurrent::all;
use crate::error::Result;

// == Entry Mapper ==
/// Computes the next value of an entry from its current one.
///
/// `current` is `None` when the key is absent. Returning `None` aborts the update.
pub trait EntryMapper<K, V>: Send + Sync {
    fn map(&self, key: &K, current: Option<&V>) -> Option<V>;
}

impl<K, V, F> EntryMapper<K, V> for F
where
    F: Fn(&K, Option<&V>) -> Option<V> + Send + Sync,
{
    fn map(&self, key: &K, current: Option<&V>) -> Option<V> {
        self(key, current)
    }
}

// == Typed Cache ==
/// A typed, asynchronous key/value cache.
///
/// Absence is reported as `None`, never as an error. Backend failures are
/// returned through the `Err` side of the resolved future.
#[async_trait]
pub trait TypedCache<K, V>: Send + Sync
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Reads a single value.
    async fn get_async(&self, key: &K) -> Result<Option<V>>;

    /// Reads several values. Keys that are not found are absent from the map.
    async fn get_bulk_async(&self, keys: &[K]) -> Result<HashMap<K, V>>;

    /// Writes a value unconditionally.
    async fn set_async(&self, key: K, value: V) -> Result<bool>;

    /// Writes every entry as an independent [`set_async`](TypedCache::set_async).
    ///
    /// Individual failures are left out of the returned map; the call only
    /// fails if every write failed.
    async fn set_bulk_async(&self, entries: HashMap<K, V>) -> Result<HashMap<K, bool>> {
        let writes: HashMap<K, _> = entries
            .into_iter()
            .map(|(key, value)| (key.clone(), self.set_async(key, value)))
            .collect();
        all(false, writes).await
    }

    /// Updates an entry through `mapper` with optimistic concurrency.
    ///
    /// Each attempt reads the current value, maps it, and stores the result
    /// only if nobody wrote the key in between. A lost race retries, up to
    /// `max_iterations` attempts in total. Returns false if the mapper
    /// declines or every attempt lost.
    async fn set_with_mapper_async(
        &self,
        key: K,
        mapper: &dyn EntryMapper<K, V>,
        max_iterations: usize,
    ) -> Result<bool>;

    /// Removes a value.
    async fn delete_async(&self, key: &K) -> Result<bool>;
}
