//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::Duration;

use tokio::time::Instant;

// == Cache Entry ==
/// A stored value together with the moment it was written.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// When the value was written
    pub written_at: Instant,
    /// Store-wide write counter at the time of this write; compare-and-set token
    pub version: u64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new entry stamped with the current time.
    pub fn new(value: V, version: u64) -> Self {
        Self {
            value,
            written_at: Instant::now(),
            version,
        }
    }

    // == Is Expired ==
    /// Checks if the entry is older than `ttl`.
    ///
    /// Boundary condition: an entry is expired once its age is greater than
    /// or equal to the TTL, so a zero TTL expires every entry immediately.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.age() >= ttl
    }

    /// Time elapsed since the entry was written.
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.written_at)
    }
}
