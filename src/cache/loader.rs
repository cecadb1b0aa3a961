//! Loader contract invoked on cache misses.

use std::collections::HashMap;

use futures::future::BoxFuture;

use crate::error::Result;

/// Future returned by a [`CacheLoader`].
pub type LoadFuture<T> = BoxFuture<'static, Result<T>>;

// == Cache Loader ==
/// Fetches values from the expensive backing source.
///
/// Producing the future and running it are separate steps on purpose: a
/// loader that panics while building its future and one whose future fails
/// are both reported to callers as errors. Implementations may be called
/// concurrently for different keys, but a
/// [`LoadingCacheDelegate`](crate::loading::LoadingCacheDelegate) never
/// loads the same key twice at once.
pub trait CacheLoader<K, V>: Send + Sync {
    /// Loads one value; `Ok(None)` means the source has nothing for `key`.
    fn load(&self, cache_name: &str, key: &K) -> LoadFuture<Option<V>>;

    /// Loads several values. Keys that cannot be resolved are left out of the map.
    fn load_bulk(&self, cache_name: &str, keys: &[K]) -> LoadFuture<HashMap<K, V>>;
}
