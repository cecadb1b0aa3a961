//! Remote store protocol
//!
//! The boundary to a memcache-like byte store. Transports implement
//! [`KeyValueProtocol`]; [`InMemoryProtocol`] is an in-process stand-in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::{CacheError, Result};

/// Outcome of a [`KeyValueProtocol::cas`] write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasResponse {
    Stored,
    /// The item was written by someone else since it was read.
    Exists,
    NotFound,
}

// == Key Value Protocol ==
/// Asynchronous byte-level operations of the remote store.
#[async_trait]
pub trait KeyValueProtocol: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Reads a value together with its CAS token.
    async fn gets(&self, key: &str) -> Result<Option<(Bytes, u64)>>;

    /// Returns only the keys that were found.
    async fn bulk_get(&self, keys: &[String]) -> Result<HashMap<String, Bytes>>;

    /// Stores `value` for `expiration_ms` milliseconds; `0` means no expiry.
    async fn set(&self, key: &str, expiration_ms: u64, value: Bytes) -> Result<bool>;

    /// Stores `value` only if no live item exists for `key`.
    async fn add(&self, key: &str, expiration_ms: u64, value: Bytes) -> Result<bool>;

    /// Stores `value` only if the item still carries the token `cas`.
    async fn cas(&self, key: &str, cas: u64, expiration_ms: u64, value: Bytes) -> Result<CasResponse>;

    async fn delete(&self, key: &str) -> Result<bool>;
}

#[derive(Debug)]
struct StoredItem {
    value: Bytes,
    expires_at: Option<Instant>,
    cas: u64,
}

impl StoredItem {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

// == In-Memory Protocol ==
/// Process-local [`KeyValueProtocol`] with memcache expiry semantics.
///
/// Can be switched to fail every call, to simulate an unreachable server.
#[derive(Debug, Default)]
pub struct InMemoryProtocol {
    items: RwLock<HashMap<String, StoredItem>>,
    unavailable: AtomicBool,
    next_cas: AtomicU64,
}

impl InMemoryProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with [`CacheError::Backend`] while `true`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Raw bytes stored under `key`, ignoring expiry.
    pub async fn raw(&self, key: &str) -> Option<Bytes> {
        self.items.read().await.get(key).map(|item| item.value.clone())
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.items
            .read()
            .await
            .values()
            .filter(|item| item.is_live(now))
            .count()
    }

    fn item(&self, expiration_ms: u64, value: Bytes) -> StoredItem {
        StoredItem {
            value,
            expires_at: (expiration_ms > 0)
                .then(|| Instant::now() + Duration::from_millis(expiration_ms)),
            cas: self.next_cas.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("server unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueProtocol for InMemoryProtocol {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.check_available()?;
        let now = Instant::now();
        Ok(self
            .items
            .read()
            .await
            .get(key)
            .filter(|item| item.is_live(now))
            .map(|item| item.value.clone()))
    }

    async fn gets(&self, key: &str) -> Result<Option<(Bytes, u64)>> {
        self.check_available()?;
        let now = Instant::now();
        Ok(self
            .items
            .read()
            .await
            .get(key)
            .filter(|item| item.is_live(now))
            .map(|item| (item.value.clone(), item.cas)))
    }

    async fn bulk_get(&self, keys: &[String]) -> Result<HashMap<String, Bytes>> {
        self.check_available()?;
        let now = Instant::now();
        let items = self.items.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| {
                items
                    .get(key)
                    .filter(|item| item.is_live(now))
                    .map(|item| (key.clone(), item.value.clone()))
            })
            .collect())
    }

    async fn set(&self, key: &str, expiration_ms: u64, value: Bytes) -> Result<bool> {
        self.check_available()?;
        let item = self.item(expiration_ms, value);
        self.items.write().await.insert(key.to_string(), item);
        Ok(true)
    }

    async fn add(&self, key: &str, expiration_ms: u64, value: Bytes) -> Result<bool> {
        self.check_available()?;
        let mut items = self.items.write().await;
        if items.get(key).is_some_and(|item| item.is_live(Instant::now())) {
            return Ok(false);
        }
        items.insert(key.to_string(), self.item(expiration_ms, value));
        Ok(true)
    }

    async fn cas(&self, key: &str, cas: u64, expiration_ms: u64, value: Bytes) -> Result<CasResponse> {
        self.check_available()?;
        let mut items = self.items.write().await;
        let current = items
            .get(key)
            .filter(|item| item.is_live(Instant::now()))
            .map(|item| item.cas);
        match current {
            None => Ok(CasResponse::NotFound),
            Some(token) if token != cas => Ok(CasResponse::Exists),
            Some(_) => {
                items.insert(key.to_string(), self.item(expiration_ms, value));
                Ok(CasResponse::Stored)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        let now = Instant::now();
        Ok(self
            .items
            .write()
            .await
            .remove(key)
            .is_some_and(|item| item.is_live(now)))
    }
}
