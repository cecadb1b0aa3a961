//! In-flight load registry
//!
//! Maps each key currently being resolved to the promise every caller for
//! that key waits on. Entries are removed by the guard that owns them, and
//! only if the registry still holds that very promise.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::concurrent::{CacheFuture, Promise};
use crate::error::{CacheError, Result};

/// Outcome of [`InFlightMap::register`].
pub(crate) enum Registration<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    /// The caller created the entry and must resolve it.
    Owned(InFlightGuard<K, V>),
    /// Another caller is already resolving the key.
    Joined(CacheFuture<Option<V>>),
}

// == In-Flight Map ==
#[derive(Debug)]
pub(crate) struct InFlightMap<K, V> {
    entries: Mutex<HashMap<K, Promise<Option<V>>>>,
}

impl<K, V> InFlightMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    // == Register ==
    /// Atomically joins the load already running for `key`, or starts owning a new one.
    pub(crate) fn register(self: &Arc<Self>, key: &K) -> Registration<K, V> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(key) {
            return Registration::Joined(existing.future());
        }

        let promise = Promise::new();
        entries.insert(key.clone(), promise.clone());
        Registration::Owned(InFlightGuard {
            map: Arc::clone(self),
            key: key.clone(),
            promise,
        })
    }

    /// Removes the entry for `key` only if it is still `promise`.
    fn remove_if_same(&self, key: &K, promise: &Promise<Option<V>>) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(current) if current.same_as(promise) => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

// == In-Flight Guard ==
/// Ownership of one in-flight entry.
///
/// Dropping the guard removes the entry. If the promise was never completed
/// (the owning task panicked or was torn down) waiters get a
/// [`CacheError::ContractViolation`] instead of hanging.
pub(crate) struct InFlightGuard<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    map: Arc<InFlightMap<K, V>>,
    key: K,
    promise: Promise<Option<V>>,
}

impl<K, V> InFlightGuard<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn key(&self) -> &K {
        &self.key
    }

    pub(crate) fn future(&self) -> CacheFuture<Option<V>> {
        self.promise.future()
    }

    /// Resolves every waiter for this key. The entry stays registered until the guard drops.
    pub(crate) fn complete(&self, result: Result<Option<V>>) -> bool {
        self.promise.complete(result)
    }
}

impl<K, V> Drop for InFlightGuard<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.promise.is_completed() {
            self.promise.set_error(CacheError::ContractViolation(
                "load abandoned before it produced a result".to_string(),
            ));
        }
        self.map.remove_if_same(&self.key, &self.promise);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(registration: Registration<String, String>) -> InFlightGuard<String, String> {
        match registration {
            Registration::Owned(guard) => guard,
            Registration::Joined(_) => panic!("expected to own the entry"),
        }
    }

    #[tokio::test]
    async fn test_second_register_joins_first() {
        let map = Arc::new(InFlightMap::new());
        let guard = owned(map.register(&"k".to_string()));

        let joined = match map.register(&"k".to_string()) {
            Registration::Joined(future) => future,
            Registration::Owned(_) => panic!("expected to join the entry"),
        };
        assert_eq!(map.len(), 1);

        guard.complete(Ok(Some("v".to_string())));
        assert_eq!(joined.await, Ok(Some("v".to_string())));

        drop(guard);
        assert_eq!(map.len(), 0);
    }

    #[tokio::test]
    async fn test_dropped_guard_fails_waiters() {
        let map: Arc<InFlightMap<String, String>> = Arc::new(InFlightMap::new());
        let guard = owned(map.register(&"k".to_string()));
        let future = guard.future();

        drop(guard);

        assert!(matches!(future.await, Err(CacheError::ContractViolation(_))));
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn test_stale_guard_does_not_remove_newer_entry() {
        let map: Arc<InFlightMap<String, String>> = Arc::new(InFlightMap::new());
        let first = owned(map.register(&"k".to_string()));
        let stale = first.promise.clone();
        drop(first);

        let _second = owned(map.register(&"k".to_string()));

        assert!(!map.remove_if_same(&"k".to_string(), &stale));
        assert_eq!(map.len(), 1);
    }
}
