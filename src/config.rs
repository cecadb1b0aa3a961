//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::cache::{CacheLoader, LocalAsyncCache};
use crate::compression::CompressionAlgorithm;
use crate::loading::LoadingCacheDelegate;

/// Default maximum number of local entries
pub const DEFAULT_MAX_ENTRIES: usize = 1_000_000;

/// Default local TTL and remote expiration, in milliseconds
pub const DEFAULT_TTL_MS: u64 = 360_000;

/// Default interval of the background expiry sweep, in milliseconds
pub const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 1_000;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Name passed to loaders and used in logs
    pub cache_name: String,
    /// Maximum number of entries the local cache can hold
    pub max_entries: usize,
    /// Age after which a local entry reads as absent
    pub ttl: Duration,
    /// Expiration sent with every remote write
    pub expiration: Duration,
    /// Compression applied to remote values, if any
    pub compression: Option<CompressionAlgorithm>,
    /// Interval of the background expiry sweep
    pub cleanup_interval: Duration,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_NAME` - Cache name (default: "default")
    /// - `CACHE_MAX_ENTRIES` - Maximum local entries (default: 1000000)
    /// - `CACHE_TTL_MS` - Local TTL in milliseconds (default: 360000)
    /// - `CACHE_EXPIRATION_MS` - Remote expiration in milliseconds (default: 360000)
    /// - `CACHE_COMPRESSION` - `gzip`, `lz4`, `zstd`, `deflate`, `deflate:N` or `none` (default: none)
    /// - `CACHE_CLEANUP_INTERVAL_MS` - Expiry sweep interval in milliseconds, non-zero (default: 1000)
    ///
    /// Unparsable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_name: env::var("CACHE_NAME").unwrap_or(defaults.cache_name),
            max_entries: parse_env("CACHE_MAX_ENTRIES").unwrap_or(defaults.max_entries),
            ttl: parse_env("CACHE_TTL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.ttl),
            expiration: parse_env("CACHE_EXPIRATION_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.expiration),
            compression: compression_from_env().unwrap_or(defaults.compression),
            cleanup_interval: nonzero_millis_env("CACHE_CLEANUP_INTERVAL_MS")
                .unwrap_or(defaults.cleanup_interval),
        }
    }

    // == Builders ==
    pub fn with_cache_name(mut self, cache_name: impl Into<String>) -> Self {
        self.cache_name = cache_name.into();
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn with_cleanup_interval(mut self, cleanup_interval: Duration) -> Self {
        self.cleanup_interval = cleanup_interval;
        self
    }

    // == Factories ==
    /// Builds a local cache sized by this configuration.
    pub fn build_local_cache<K, V>(&self) -> LocalAsyncCache<K, V>
    where
        K: Eq + std::hash::Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        LocalAsyncCache::from_config(self)
    }

    /// Builds a local cache wrapped in a loading delegate named after this configuration.
    pub fn build_loading_cache<K, V>(
        &self,
        loader: Arc<dyn CacheLoader<K, V>>,
    ) -> LoadingCacheDelegate<K, V, LocalAsyncCache<K, V>>
    where
        K: Eq + std::hash::Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let local = Arc::new(self.build_local_cache().with_loader(Arc::clone(&loader)));
        LoadingCacheDelegate::new(local, loader, self.cache_name.clone())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        warn!(variable = name, value = %raw, "ignoring unparsable configuration value");
    }
    parsed
}

fn nonzero_millis_env(name: &str) -> Option<Duration> {
    let millis: u64 = parse_env(name)?;
    if millis == 0 {
        warn!(variable = name, "ignoring zero interval");
        return None;
    }
    Some(Duration::from_millis(millis))
}

/// `None` when unset or unparsable, `Some(None)` for an explicit `none`.
fn compression_from_env() -> Option<Option<CompressionAlgorithm>> {
    let raw = env::var("CACHE_COMPRESSION").ok()?;
    if raw.trim().eq_ignore_ascii_case("none") {
        return Some(None);
    }
    match raw.parse::<CompressionAlgorithm>() {
        Ok(algorithm) => Some(Some(algorithm)),
        Err(err) => {
            warn!(error = %err, "ignoring CACHE_COMPRESSION");
            None
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_name: "default".to_string(),
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: Duration::from_millis(DEFAULT_TTL_MS),
            expiration: Duration::from_millis(DEFAULT_TTL_MS),
            compression: None,
            cleanup_interval: Duration::from_millis(DEFAULT_CLEANUP_INTERVAL_MS),
        }
    }
}
