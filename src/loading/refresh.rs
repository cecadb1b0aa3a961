//! Refreshing Loading Cache
//!
//! A [`LoadingCacheDelegate`] whose values carry their write time. Reads keep
//! serving the stored value, and once it is older than `refresh_after_write`
//! a single background reload per key replaces it. Keys whose reload failed
//! are left alone until the retry interval has passed.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::{CacheLoader, CacheStore, EntryMapper, LoadFuture, TypedCache};
use crate::error::Result;
use crate::loading::delegate::guard_load;
use crate::loading::inflight::{InFlightMap, Registration};
use crate::loading::LoadingCacheDelegate;

/// Most keys remembered as recently failed
const MAX_FAILED_RELOADS: usize = 10_000;

// == Value With Write Time ==
/// A cached value stamped with its write time, in milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueWithWriteTime<V> {
    pub value: V,
    pub write_time: u64,
}

impl<V> ValueWithWriteTime<V> {
    pub fn new(value: V, write_time: u64) -> Self {
        Self { value, write_time }
    }
}

/// Wall-clock milliseconds, advanced by the runtime clock from a fixed anchor
/// so that paused test time moves it too.
#[derive(Debug)]
struct WriteClock {
    anchor_ms: u64,
    anchor: Instant,
}

impl WriteClock {
    fn new() -> Self {
        let anchor_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(millis)
            .unwrap_or(0);
        Self {
            anchor_ms,
            anchor: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.anchor_ms.saturating_add(millis(self.anchor.elapsed()))
    }

    fn stamp<V>(&self, value: V) -> ValueWithWriteTime<V> {
        ValueWithWriteTime::new(value, self.now_ms())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// == Stamping Adapters ==
/// Stamps everything the wrapped loader produces with the time it arrived.
struct StampingLoader<K, V> {
    loader: Arc<dyn CacheLoader<K, V>>,
    clock: Arc<WriteClock>,
}

impl<K, V> CacheLoader<K, ValueWithWriteTime<V>> for StampingLoader<K, V>
where
    K: Eq + Hash + Send + 'static,
    V: Send + 'static,
{
    fn load(&self, cache_name: &str, key: &K) -> LoadFuture<Option<ValueWithWriteTime<V>>> {
        let clock = Arc::clone(&self.clock);
        self.loader
            .load(cache_name, key)
            .map(move |loaded| loaded.map(|value| value.map(|value| clock.stamp(value))))
            .boxed()
    }

    fn load_bulk(
        &self,
        cache_name: &str,
        keys: &[K],
    ) -> LoadFuture<HashMap<K, ValueWithWriteTime<V>>> {
        let clock = Arc::clone(&self.clock);
        self.loader
            .load_bulk(cache_name, keys)
            .map(move |loaded| {
                loaded.map(|values| {
                    values
                        .into_iter()
                        .map(|(key, value)| (key, clock.stamp(value)))
                        .collect()
                })
            })
            .boxed()
    }
}

/// Applies a mapper of plain values and stamps its result.
struct StampingMapper<'a, K, V> {
    mapper: &'a dyn EntryMapper<K, V>,
    clock: &'a WriteClock,
}

impl<K, V> EntryMapper<K, ValueWithWriteTime<V>> for StampingMapper<'_, K, V> {
    fn map(
        &self,
        key: &K,
        current: Option<&ValueWithWriteTime<V>>,
    ) -> Option<ValueWithWriteTime<V>> {
        self.mapper
            .map(key, current.map(|stamped| &stamped.value))
            .map(|value| self.clock.stamp(value))
    }
}

// == Refresh Stats ==
/// Snapshot of the background refresh counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshStats {
    /// Reloads started, single or bulk
    pub refreshes: u64,
    /// Reloads that failed
    pub refresh_errors: u64,
}

#[derive(Debug, Default)]
struct RefreshCounters {
    refreshes: AtomicU64,
    refresh_errors: AtomicU64,
}

struct RefreshCore<K, V, C: ?Sized>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    delegate: LoadingCacheDelegate<K, ValueWithWriteTime<V>, C>,
    loader: Arc<StampingLoader<K, V>>,
    clock: Arc<WriteClock>,
    refreshing: Arc<InFlightMap<K, ValueWithWriteTime<V>>>,
    failed_reloads: Mutex<CacheStore<K, ()>>,
    refresh_after_write_ms: u64,
    counters: RefreshCounters,
}

// == Refresh Loading Cache Delegate ==
/// A [`TypedCache`] that serves stored values and refreshes stale ones in
/// the background.
///
/// The wrapped cache holds [`ValueWithWriteTime`] so any backend, local or
/// remote, can carry the write time. Like [`LoadingCacheDelegate`], it must
/// be used inside a Tokio runtime.
pub struct RefreshLoadingCacheDelegate<K, V, C: ?Sized>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    core: Arc<RefreshCore<K, V, C>>,
}

impl<K, V, C> RefreshLoadingCacheDelegate<K, V, C>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: TypedCache<K, ValueWithWriteTime<V>> + ?Sized + 'static,
{
    // == Constructor ==
    /// Creates a refreshing delegate over `cache`.
    ///
    /// # Arguments
    /// * `cache` - Cache holding stamped values
    /// * `loader` - Source of values for misses and refreshes
    /// * `cache_name` - Passed to every loader call
    /// * `refresh_after_write` - Age after which a read triggers a reload
    /// * `retry_interval` - Pause before a key whose reload failed is retried;
    ///   defaults to a tenth of `refresh_after_write`
    pub fn new(
        cache: Arc<C>,
        loader: Arc<dyn CacheLoader<K, V>>,
        cache_name: impl Into<String>,
        refresh_after_write: Duration,
        retry_interval: Option<Duration>,
    ) -> Self {
        let clock = Arc::new(WriteClock::new());
        let loader = Arc::new(StampingLoader {
            loader,
            clock: Arc::clone(&clock),
        });
        let delegate = LoadingCacheDelegate::new(
            cache,
            Arc::clone(&loader) as Arc<dyn CacheLoader<K, ValueWithWriteTime<V>>>,
            cache_name,
        );
        let retry_interval = retry_interval.unwrap_or(refresh_after_write / 10);
        debug!(
            cache = %delegate.cache_name(),
            refresh_after_write_ms = millis(refresh_after_write),
            retry_interval_ms = millis(retry_interval),
            "refreshing cache delegate created"
        );

        Self {
            core: Arc::new(RefreshCore {
                delegate,
                loader,
                clock,
                refreshing: Arc::new(InFlightMap::new()),
                failed_reloads: Mutex::new(CacheStore::new(MAX_FAILED_RELOADS, retry_interval)),
                refresh_after_write_ms: millis(refresh_after_write),
                counters: RefreshCounters::default(),
            }),
        }
    }

    pub fn cache_name(&self) -> &str {
        self.core.delegate.cache_name()
    }

    /// The loading delegate that resolves misses.
    pub fn loading(&self) -> &LoadingCacheDelegate<K, ValueWithWriteTime<V>, C> {
        &self.core.delegate
    }

    /// Number of keys with a refresh in flight.
    pub fn refreshing(&self) -> usize {
        self.core.refreshing.len()
    }

    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            refreshes: self.core.counters.refreshes.load(Ordering::Relaxed),
            refresh_errors: self.core.counters.refresh_errors.load(Ordering::Relaxed),
        }
    }
}

impl<K, V, C> RefreshCore<K, V, C>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: TypedCache<K, ValueWithWriteTime<V>> + ?Sized + 'static,
{
    fn is_stale(&self, stamped: &ValueWithWriteTime<V>, now_ms: u64) -> bool {
        now_ms.saturating_sub(stamped.write_time) >= self.refresh_after_write_ms
    }

    fn failed_recently(&self, key: &K) -> bool {
        self.failed_reloads.lock().peek(key).is_some()
    }

    fn record_failure(&self, keys: impl IntoIterator<Item = K>) {
        let mut failed = self.failed_reloads.lock();
        for key in keys {
            failed.set(key, ());
        }
        self.counters.refresh_errors.fetch_add(1, Ordering::Relaxed);
    }

    // == Refresh One ==
    fn refresh(self: &Arc<Self>, key: &K) {
        if self.failed_recently(key) {
            return;
        }
        let Registration::Owned(guard) = self.refreshing.register(key) else {
            return;
        };

        self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
        let load = guard_load(panic::catch_unwind(AssertUnwindSafe(|| {
            self.loader.load(self.delegate.cache_name(), key)
        })));

        let core = Arc::clone(self);
        tokio::spawn(async move {
            let result = load.await;
            let written = match &result {
                Ok(Some(stamped)) => {
                    core.delegate
                        .set_async(guard.key().clone(), stamped.clone())
                        .await
                }
                // The source no longer has the key.
                Ok(None) => core.delegate.delete_async(guard.key()).await,
                Err(err) => {
                    warn!(cache = %core.delegate.cache_name(), error = %err, "refresh failed");
                    core.record_failure([guard.key().clone()]);
                    Ok(false)
                }
            };
            if let Err(err) = written {
                debug!(cache = %core.delegate.cache_name(), error = %err, "refresh write-back failed");
            }
            guard.complete(result);
        });
    }

    // == Refresh Many ==
    fn refresh_many(self: &Arc<Self>, keys: Vec<K>) {
        let guards: Vec<_> = keys
            .iter()
            .filter(|key| !self.failed_recently(key))
            .filter_map(|key| match self.refreshing.register(key) {
                Registration::Owned(guard) => Some(guard),
                Registration::Joined(_) => None,
            })
            .collect();
        if guards.is_empty() {
            return;
        }

        self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
        let refresh_keys: Vec<K> = guards.iter().map(|guard| guard.key().clone()).collect();
        let load = guard_load(panic::catch_unwind(AssertUnwindSafe(|| {
            self.loader.load_bulk(self.delegate.cache_name(), &refresh_keys)
        })));

        let core = Arc::clone(self);
        tokio::spawn(async move {
            match load.await {
                Ok(values) => {
                    for guard in &guards {
                        guard.complete(Ok(values.get(guard.key()).cloned()));
                    }
                    if !values.is_empty() {
                        if let Err(err) = core.delegate.set_bulk_async(values).await {
                            debug!(cache = %core.delegate.cache_name(), error = %err, "bulk refresh write-back failed");
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        cache = %core.delegate.cache_name(),
                        keys = guards.len(),
                        error = %err,
                        "bulk refresh failed"
                    );
                    core.record_failure(guards.iter().map(|guard| guard.key().clone()));
                    for guard in &guards {
                        guard.complete(Err(err.clone()));
                    }
                }
            }
        });
    }
}

#[async_trait]
impl<K, V, C> TypedCache<K, V> for RefreshLoadingCacheDelegate<K, V, C>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: TypedCache<K, ValueWithWriteTime<V>> + ?Sized + 'static,
{
    async fn get_async(&self, key: &K) -> Result<Option<V>> {
        let stamped = self.core.delegate.get_async(key).await?;
        if let Some(stamped) = &stamped {
            if self.core.is_stale(stamped, self.core.clock.now_ms()) {
                self.core.refresh(key);
            }
        }
        Ok(stamped.map(|stamped| stamped.value))
    }

    async fn get_bulk_async(&self, keys: &[K]) -> Result<HashMap<K, V>> {
        let found = self.core.delegate.get_bulk_async(keys).await?;

        let now_ms = self.core.clock.now_ms();
        let stale: Vec<K> = found
            .iter()
            .filter(|(_, stamped)| self.core.is_stale(stamped, now_ms))
            .map(|(key, _)| key.clone())
            .collect();
        if !stale.is_empty() {
            self.core.refresh_many(stale);
        }

        Ok(found
            .into_iter()
            .map(|(key, stamped)| (key, stamped.value))
            .collect())
    }

    async fn set_async(&self, key: K, value: V) -> Result<bool> {
        let stamped = self.core.clock.stamp(value);
        self.core.delegate.set_async(key, stamped).await
    }

    async fn set_bulk_async(&self, entries: HashMap<K, V>) -> Result<HashMap<K, bool>> {
        let stamped = entries
            .into_iter()
            .map(|(key, value)| (key, self.core.clock.stamp(value)))
            .collect();
        self.core.delegate.set_bulk_async(stamped).await
    }

    async fn set_with_mapper_async(
        &self,
        key: K,
        mapper: &dyn EntryMapper<K, V>,
        max_iterations: usize,
    ) -> Result<bool> {
        let stamping = StampingMapper {
            mapper,
            clock: &self.core.clock,
        };
        self.core
            .delegate
            .set_with_mapper_async(key, &stamping, max_iterations)
            .await
    }

    async fn delete_async(&self, key: &K) -> Result<bool> {
        self.core.delegate.delete_async(key).await
    }
}

impl<K, V, C: ?Sized> fmt::Debug for RefreshLoadingCacheDelegate<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshLoadingCacheDelegate")
            .field("refresh_after_write_ms", &self.core.refresh_after_write_ms)
            .finish_non_exhaustive()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalAsyncCache;
    use crate::error::CacheError;
    use std::sync::atomic::AtomicUsize;

    const REFRESH_AFTER: Duration = Duration::from_millis(500);
    const LOAD_DELAY: Duration = Duration::from_millis(100);

    type StampedCache = LocalAsyncCache<String, ValueWithWriteTime<String>>;

    /// Loader that answers after [`LOAD_DELAY`]. Keys starting with `fail`
    /// error out and keys starting with `gone` have no value.
    #[derive(Default)]
    struct SlowSource {
        loads: AtomicUsize,
        bulk_loads: AtomicUsize,
        bulk_keys: AtomicUsize,
    }

    impl SlowSource {
        fn answer(key: &str, prefix: &str) -> Result<Option<String>> {
            if key.starts_with("fail") {
                Err(CacheError::Loader(format!("cannot load {key}")))
            } else if key.starts_with("gone") {
                Ok(None)
            } else {
                Ok(Some(format!("{prefix}{key}")))
            }
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl CacheLoader<String, String> for SlowSource {
        fn load(&self, _cache_name: &str, key: &String) -> LoadFuture<Option<String>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let answer = Self::answer(key, "ValueFor-");
            async move {
                tokio::time::sleep(LOAD_DELAY).await;
                answer
            }
            .boxed()
        }

        fn load_bulk(&self, _cache_name: &str, keys: &[String]) -> LoadFuture<HashMap<String, String>> {
            self.bulk_loads.fetch_add(1, Ordering::SeqCst);
            self.bulk_keys.fetch_add(keys.len(), Ordering::SeqCst);
            let answers: Result<HashMap<String, String>> = keys
                .iter()
                .filter_map(|key| {
                    Self::answer(key, "ValueFor-Bulk-")
                        .map(|value| value.map(|value| (key.clone(), value)))
                        .transpose()
                })
                .collect();
            async move {
                tokio::time::sleep(LOAD_DELAY).await;
                answers
            }
            .boxed()
        }
    }

    fn s(value: &str) -> String {
        value.to_string()
    }

    fn refreshing_cache(
        source: Arc<SlowSource>,
        retry_interval: Option<Duration>,
    ) -> (
        Arc<StampedCache>,
        RefreshLoadingCacheDelegate<String, String, StampedCache>,
    ) {
        let local = Arc::new(LocalAsyncCache::new("refresh", 100, Duration::from_secs(3600)));
        let cache: RefreshLoadingCacheDelegate<String, String, StampedCache> =
            RefreshLoadingCacheDelegate::new(
                Arc::clone(&local),
                source,
                "refresh",
                REFRESH_AFTER,
                retry_interval,
            );
        (local, cache)
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_goes_to_loader_and_is_stamped() {
        let source = Arc::new(SlowSource::default());
        let (local, cache) = refreshing_cache(Arc::clone(&source), None);

        assert_eq!(cache.get_async(&s("key1")).await, Ok(Some(s("ValueFor-key1"))));
        tokio::time::sleep(Duration::from_millis(1)).await;

        let stored = local.get_async(&s("key1")).await.unwrap().expect("written back");
        assert_eq!(stored.value, "ValueFor-key1");
        assert!(stored.write_time > 0);
        assert_eq!(cache.get_async(&s("gone")).await, Ok(None));
        assert!(cache.get_async(&s("fail")).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reads_serve_old_value_and_refresh_once() {
        let source = Arc::new(SlowSource::default());
        let (_local, cache) = refreshing_cache(Arc::clone(&source), None);
        let key = s("key1");

        cache.set_async(key.clone(), s("value1")).await.unwrap();
        assert_eq!(cache.get_async(&key).await, Ok(Some(s("value1"))));
        assert_eq!(source.loads(), 0);

        tokio::time::sleep(REFRESH_AFTER).await;
        let reads = (0..10).map(|_| cache.get_async(&key));
        let results = futures::future::join_all(reads).await;

        assert!(results.iter().all(|result| result == &Ok(Some(s("value1")))));
        assert_eq!(source.loads(), 1);
        assert_eq!(cache.refreshing(), 1);

        tokio::time::sleep(LOAD_DELAY * 2).await;

        assert_eq!(cache.get_async(&key).await, Ok(Some(s("ValueFor-key1"))));
        assert_eq!(source.loads(), 1);
        assert_eq!(cache.refreshing(), 0);
        assert_eq!(cache.stats().refreshes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_to_nothing_removes_value() {
        let source = Arc::new(SlowSource::default());
        let (local, cache) = refreshing_cache(Arc::clone(&source), None);

        cache.set_async(s("gone1"), s("value1")).await.unwrap();
        tokio::time::sleep(REFRESH_AFTER).await;

        assert_eq!(cache.get_async(&s("gone1")).await, Ok(Some(s("value1"))));
        tokio::time::sleep(LOAD_DELAY * 2).await;

        assert_eq!(local.get_async(&s("gone1")).await, Ok(None));
        assert_eq!(cache.get_async(&s("gone1")).await, Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_value_and_backs_off() {
        let source = Arc::new(SlowSource::default());
        let retry = Duration::from_secs(1);
        let (_local, cache) = refreshing_cache(Arc::clone(&source), Some(retry));
        let key = s("fail1");

        cache.set_async(key.clone(), s("value1")).await.unwrap();
        tokio::time::sleep(REFRESH_AFTER).await;

        assert_eq!(cache.get_async(&key).await, Ok(Some(s("value1"))));
        assert_eq!(source.loads(), 1);
        tokio::time::sleep(LOAD_DELAY * 2).await;

        // Still stale, but the last reload failed moments ago.
        assert_eq!(cache.get_async(&key).await, Ok(Some(s("value1"))));
        assert_eq!(source.loads(), 1);
        assert_eq!(cache.stats().refresh_errors, 1);

        tokio::time::sleep(retry).await;

        assert_eq!(cache.get_async(&key).await, Ok(Some(s("value1"))));
        assert_eq!(source.loads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_retry_interval_is_a_tenth_of_refresh() {
        let source = Arc::new(SlowSource::default());
        let (_local, cache) = refreshing_cache(Arc::clone(&source), None);
        let key = s("fail1");

        cache.set_async(key.clone(), s("value1")).await.unwrap();
        tokio::time::sleep(REFRESH_AFTER).await;
        cache.get_async(&key).await.unwrap();
        tokio::time::sleep(LOAD_DELAY + Duration::from_millis(10)).await;

        cache.get_async(&key).await.unwrap();
        assert_eq!(source.loads(), 1);

        tokio::time::sleep(REFRESH_AFTER / 10).await;
        cache.get_async(&key).await.unwrap();
        assert_eq!(source.loads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_read_refreshes_only_stale_keys() {
        let source = Arc::new(SlowSource::default());
        let (_local, cache) = refreshing_cache(Arc::clone(&source), None);

        cache.set_async(s("key1"), s("value1")).await.unwrap();
        tokio::time::sleep(REFRESH_AFTER).await;
        cache.set_async(s("key2"), s("value2")).await.unwrap();

        let values = cache.get_bulk_async(&[s("key1"), s("key2")]).await.unwrap();
        assert_eq!(values[&s("key1")], "value1");
        assert_eq!(values[&s("key2")], "value2");
        assert_eq!(source.bulk_loads.load(Ordering::SeqCst), 1);
        assert_eq!(source.bulk_keys.load(Ordering::SeqCst), 1);

        // A second stale read while the reload runs does not start another.
        cache.get_bulk_async(&[s("key1")]).await.unwrap();
        assert_eq!(source.bulk_loads.load(Ordering::SeqCst), 1);

        tokio::time::sleep(LOAD_DELAY * 2).await;

        let values = cache.get_bulk_async(&[s("key1"), s("key2")]).await.unwrap();
        assert_eq!(values[&s("key1")], "ValueFor-Bulk-key1");
        assert_eq!(values[&s("key2")], "value2");
        assert_eq!(source.bulk_loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_bulk_refresh_backs_off_every_key() {
        let source = Arc::new(SlowSource::default());
        let (_local, cache) = refreshing_cache(Arc::clone(&source), Some(Duration::from_secs(1)));
        let keys = [s("fail1"), s("fail2")];

        cache
            .set_bulk_async(HashMap::from([(s("fail1"), s("a")), (s("fail2"), s("b"))]))
            .await
            .unwrap();
        tokio::time::sleep(REFRESH_AFTER).await;

        assert_eq!(cache.get_bulk_async(&keys).await.unwrap().len(), 2);
        tokio::time::sleep(LOAD_DELAY * 2).await;
        assert_eq!(cache.get_bulk_async(&keys).await.unwrap().len(), 2);

        assert_eq!(source.bulk_loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().refresh_errors, 1);
        assert_eq!(cache.refreshing(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mapper_sees_plain_value_and_restamps() {
        let source = Arc::new(SlowSource::default());
        let (local, cache) = refreshing_cache(Arc::clone(&source), None);

        cache.set_async(s("k"), s("v")).await.unwrap();
        let written = local.get_async(&s("k")).await.unwrap().unwrap().write_time;
        tokio::time::sleep(REFRESH_AFTER).await;

        let append = |_: &String, current: Option<&String>| -> Option<String> {
            current.map(|value| format!("{value}!"))
        };
        assert_eq!(cache.set_with_mapper_async(s("k"), &append, 3).await, Ok(true));

        let stored = local.get_async(&s("k")).await.unwrap().unwrap();
        assert_eq!(stored.value, "v!");
        assert!(stored.write_time >= written + 500);

        // Freshly stamped, so no refresh.
        assert_eq!(cache.get_async(&s("k")).await, Ok(Some(s("v!"))));
        assert_eq!(source.loads(), 0);
    }

    #[tokio::test]
    async fn test_delete_forwards() {
        let source = Arc::new(SlowSource::default());
        let (local, cache) = refreshing_cache(source, None);

        cache.set_async(s("k"), s("v")).await.unwrap();
        assert_eq!(cache.delete_async(&s("k")).await, Ok(true));
        assert!(local.is_empty());
        assert_eq!(cache.cache_name(), "refresh");
    }
}
