//! Loading Cache Delegate
//!
//! Wraps a [`TypedCache`] and fills its misses from a [`CacheLoader`], with
//! at most one load in flight per key across concurrent callers.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{self, FutureExt};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheLoader, EntryMapper, LoadFuture, TypedCache};
use crate::concurrent::all_present;
use crate::error::{CacheError, Result};
use crate::loading::inflight::{InFlightGuard, InFlightMap, Registration};

// == Loading Stats ==
/// Snapshot of the delegate's load counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadingStats {
    /// Single-key loader invocations
    pub loads: u64,
    /// Bulk loader invocations
    pub bulk_loads: u64,
    /// Loader invocations that failed
    pub load_errors: u64,
    /// Key reads that joined a load already in flight
    pub deduplicated: u64,
}

#[derive(Debug, Default)]
struct LoadingCounters {
    loads: AtomicU64,
    bulk_loads: AtomicU64,
    load_errors: AtomicU64,
    deduplicated: AtomicU64,
}

impl LoadingCounters {
    fn snapshot(&self) -> LoadingStats {
        LoadingStats {
            loads: self.loads.load(Ordering::Relaxed),
            bulk_loads: self.bulk_loads.load(Ordering::Relaxed),
            load_errors: self.load_errors.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
        }
    }
}

struct DelegateCore<K, V, C: ?Sized>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    cache: Arc<C>,
    loader: Arc<dyn CacheLoader<K, V>>,
    cache_name: String,
    in_flight: Arc<InFlightMap<K, V>>,
    counters: LoadingCounters,
}

// == Loading Cache Delegate ==
/// A [`TypedCache`] that loads missing values through a [`CacheLoader`].
///
/// Reads are resolved on spawned tasks, so a load finishes, and is written
/// back, even if the caller that started it stops waiting. The returned
/// futures must therefore be polled inside a Tokio runtime.
///
/// Writes and deletes go straight to the wrapped cache.
pub struct LoadingCacheDelegate<K, V, C: ?Sized>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    core: Arc<DelegateCore<K, V, C>>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, C> LoadingCacheDelegate<K, V, C>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: TypedCache<K, V> + ?Sized + 'static,
{
    // == Constructor ==
    /// Creates a delegate over `cache`.
    ///
    /// # Arguments
    /// * `cache` - Cache consulted first and written back to after loads
    /// * `loader` - Source of values for keys the cache does not hold
    /// * `cache_name` - Passed to every loader call
    pub fn new(
        cache: Arc<C>,
        loader: Arc<dyn CacheLoader<K, V>>,
        cache_name: impl Into<String>,
    ) -> Self {
        let cache_name = cache_name.into();
        debug!(cache = %cache_name, "loading cache delegate created");

        Self {
            core: Arc::new(DelegateCore {
                cache,
                loader,
                cache_name,
                in_flight: Arc::new(InFlightMap::new()),
                counters: LoadingCounters::default(),
            }),
            _marker: PhantomData,
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.core.cache_name
    }

    /// The wrapped cache.
    pub fn inner(&self) -> &Arc<C> {
        &self.core.cache
    }

    /// Number of keys currently being resolved.
    pub fn in_flight(&self) -> usize {
        self.core.in_flight.len()
    }

    pub fn stats(&self) -> LoadingStats {
        self.core.counters.snapshot()
    }

    fn record_joined(&self) {
        self.core.counters.deduplicated.fetch_add(1, Ordering::Relaxed);
    }
}

impl<K, V, C> DelegateCore<K, V, C>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: TypedCache<K, V> + ?Sized + 'static,
{
    // == Resolve One ==
    async fn resolve_one(self: Arc<Self>, guard: InFlightGuard<K, V>) {
        match self.cache.get_async(guard.key()).await {
            Ok(Some(value)) => {
                guard.complete(Ok(Some(value)));
                return;
            }
            Ok(None) => {}
            Err(err) => {
                debug!(cache = %self.cache_name, error = %err, "cache read failed, loading instead");
            }
        }

        self.counters.loads.fetch_add(1, Ordering::Relaxed);
        match self.start_load(guard.key()).await {
            Ok(loaded) => {
                guard.complete(Ok(loaded.clone()));
                if let Some(value) = loaded {
                    if let Err(err) = self.cache.set_async(guard.key().clone(), value).await {
                        debug!(cache = %self.cache_name, error = %err, "write-back failed");
                    }
                }
            }
            Err(err) => {
                self.counters.load_errors.fetch_add(1, Ordering::Relaxed);
                warn!(cache = %self.cache_name, error = %err, "load failed");
                guard.complete(Err(err));
            }
        }
    }

    // == Resolve Many ==
    async fn resolve_many(self: Arc<Self>, guards: Vec<InFlightGuard<K, V>>) {
        let keys: Vec<K> = guards.iter().map(|guard| guard.key().clone()).collect();
        let found = match self.cache.get_bulk_async(&keys).await {
            Ok(found) => found,
            Err(err) => {
                debug!(cache = %self.cache_name, error = %err, "bulk cache read failed, loading instead");
                HashMap::new()
            }
        };

        let mut missing = Vec::new();
        for guard in guards {
            match found.get(guard.key()) {
                Some(value) => {
                    guard.complete(Ok(Some(value.clone())));
                }
                None => missing.push(guard),
            }
        }

        if missing.is_empty() {
            return;
        }

        let missing_keys: Vec<K> = missing.iter().map(|guard| guard.key().clone()).collect();
        self.counters.bulk_loads.fetch_add(1, Ordering::Relaxed);
        match self.start_bulk_load(&missing_keys).await {
            Ok(elements) => {
                for guard in &missing {
                    guard.complete(Ok(elements.get(guard.key()).cloned()));
                }
                if !elements.is_empty() {
                    if let Err(err) = self.cache.set_bulk_async(elements).await {
                        debug!(cache = %self.cache_name, error = %err, "bulk write-back failed");
                    }
                }
            }
            Err(err) => {
                self.counters.load_errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    cache = %self.cache_name,
                    keys = missing.len(),
                    error = %err,
                    "bulk load failed"
                );
                for guard in &missing {
                    guard.complete(Err(err.clone()));
                }
            }
        }
    }

    /// Calls the loader, turning a panic while building the future into
    /// [`CacheError::Loader`] and a panic while polling it into
    /// [`CacheError::ContractViolation`].
    fn start_load(&self, key: &K) -> LoadFuture<Option<V>> {
        let started = panic::catch_unwind(AssertUnwindSafe(|| {
            self.loader.load(&self.cache_name, key)
        }));
        guard_load(started)
    }

    fn start_bulk_load(&self, keys: &[K]) -> LoadFuture<HashMap<K, V>> {
        let started = panic::catch_unwind(AssertUnwindSafe(|| {
            self.loader.load_bulk(&self.cache_name, keys)
        }));
        guard_load(started)
    }
}

/// Wraps a loader call so neither building nor polling its future can unwind.
pub(super) fn guard_load<T: Send + 'static>(
    started: std::thread::Result<LoadFuture<T>>,
) -> LoadFuture<T> {
    match started {
        Ok(load) => AssertUnwindSafe(load)
            .catch_unwind()
            .map(|outcome| {
                outcome.unwrap_or_else(|payload| {
                    Err(CacheError::ContractViolation(format!(
                        "loader future panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                })
            })
            .boxed(),
        Err(payload) => {
            future::ready(Err(CacheError::Loader(panic_message(payload.as_ref())))).boxed()
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "loader panicked".to_string()
    }
}

#[async_trait]
impl<K, V, C> TypedCache<K, V> for LoadingCacheDelegate<K, V, C>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: TypedCache<K, V> + ?Sized + 'static,
{
    async fn get_async(&self, key: &K) -> Result<Option<V>> {
        match self.core.in_flight.register(key) {
            Registration::Joined(pending) => {
                self.record_joined();
                pending.await
            }
            Registration::Owned(guard) => {
                let pending = guard.future();
                tokio::spawn(Arc::clone(&self.core).resolve_one(guard));
                pending.await
            }
        }
    }

    async fn get_bulk_async(&self, keys: &[K]) -> Result<HashMap<K, V>> {
        let mut pending = HashMap::with_capacity(keys.len());
        let mut owned = Vec::new();

        for key in keys {
            if pending.contains_key(key) {
                continue;
            }
            match self.core.in_flight.register(key) {
                Registration::Joined(joined) => {
                    self.record_joined();
                    pending.insert(key.clone(), joined);
                }
                Registration::Owned(guard) => {
                    pending.insert(key.clone(), guard.future());
                    owned.push(guard);
                }
            }
        }

        if !owned.is_empty() {
            tokio::spawn(Arc::clone(&self.core).resolve_many(owned));
        }

        all_present(false, pending).await
    }

    async fn set_async(&self, key: K, value: V) -> Result<bool> {
        self.core.cache.set_async(key, value).await
    }

    async fn set_bulk_async(&self, entries: HashMap<K, V>) -> Result<HashMap<K, bool>> {
        self.core.cache.set_bulk_async(entries).await
    }

    async fn set_with_mapper_async(
        &self,
        key: K,
        mapper: &dyn EntryMapper<K, V>,
        max_iterations: usize,
    ) -> Result<bool> {
        self.core
            .cache
            .set_with_mapper_async(key, mapper, max_iterations)
            .await
    }

    async fn delete_async(&self, key: &K) -> Result<bool> {
        self.core.cache.delete_async(key).await
    }
}

impl<K, V, C: ?Sized> fmt::Debug for LoadingCacheDelegate<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingCacheDelegate")
            .field("cache_name", &self.core.cache_name)
            .field("in_flight", &self.core.in_flight.len())
            .finish_non_exhaustive()
    }
}
