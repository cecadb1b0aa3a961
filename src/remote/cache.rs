//! Remote Cache Adapter
//!
//! [`TypedCache`] over a memcache-like byte store: keys are translated to
//! wire keys, values go through a [`Transcoder`], and every write uses the
//! same fixed expiration.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::cache::{EntryMapper, TypedCache};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::remote::{
    json_transcoder, validate_key, CasResponse, KeyTranslator, KeyValueProtocol, Transcoder,
};

/// Largest encoded value the store accepts, in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024;

// == Remote Cache ==
pub struct RemoteCache<K, V, P: ?Sized, T> {
    protocol: Arc<P>,
    translator: Box<dyn KeyTranslator<K>>,
    transcoder: T,
    expiration: Duration,
    _marker: PhantomData<fn() -> V>,
}

impl<K, V, P, T> RemoteCache<K, V, P, T>
where
    P: KeyValueProtocol + ?Sized,
    T: Transcoder<V>,
{
    // == Constructor ==
    /// Creates an adapter over `protocol`.
    ///
    /// # Arguments
    /// * `protocol` - Connection to the remote store
    /// * `translator` - Maps typed keys to wire keys
    /// * `transcoder` - Encodes values, optionally compressing them
    /// * `expiration` - Expiration sent with every write; zero means none
    pub fn new(
        protocol: Arc<P>,
        translator: impl KeyTranslator<K> + 'static,
        transcoder: T,
        expiration: Duration,
    ) -> Self {
        debug!(
            expiration_ms = expiration.as_millis() as u64,
            "remote cache created"
        );

        Self {
            protocol,
            translator: Box::new(translator),
            transcoder,
            expiration,
            _marker: PhantomData,
        }
    }

    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    pub fn protocol(&self) -> &Arc<P> {
        &self.protocol
    }

    fn wire_key(&self, key: &K) -> Result<String> {
        let wire_key = self.translator.translate(key);
        validate_key(&wire_key)?;
        Ok(wire_key)
    }

    fn expiration_ms(&self) -> u64 {
        u64::try_from(self.expiration.as_millis()).unwrap_or(u64::MAX)
    }

    fn encode(&self, value: &V) -> Result<Bytes> {
        let data = self.transcoder.encode(value)?;
        if data.len() > MAX_VALUE_SIZE {
            return Err(CacheError::ValueTooLarge {
                size: data.len(),
                limit: MAX_VALUE_SIZE,
            });
        }
        Ok(data)
    }
}

impl<K, V, P> RemoteCache<K, V, P, Box<dyn Transcoder<V>>>
where
    P: KeyValueProtocol + ?Sized,
    V: Serialize + DeserializeOwned + 'static,
{
    /// Creates a JSON-encoding adapter using the expiration and compression of `config`.
    pub fn from_config(
        protocol: Arc<P>,
        translator: impl KeyTranslator<K> + 'static,
        config: &CacheConfig,
    ) -> Self {
        Self::new(
            protocol,
            translator,
            json_transcoder(config.compression),
            config.expiration,
        )
    }
}

#[async_trait]
impl<K, V, P, T> TypedCache<K, V> for RemoteCache<K, V, P, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    P: KeyValueProtocol + ?Sized,
    T: Transcoder<V>,
{
    async fn get_async(&self, key: &K) -> Result<Option<V>> {
        let wire_key = self.wire_key(key)?;
        match self.protocol.get(&wire_key).await? {
            Some(data) => self.transcoder.decode(&data).map(Some),
            None => Ok(None),
        }
    }

    async fn get_bulk_async(&self, keys: &[K]) -> Result<HashMap<K, V>> {
        // Distinct typed keys may translate to the same wire key.
        let mut by_wire_key: HashMap<String, Vec<K>> = HashMap::with_capacity(keys.len());
        for key in keys {
            by_wire_key.entry(self.wire_key(key)?).or_default().push(key.clone());
        }
        if by_wire_key.is_empty() {
            return Ok(HashMap::new());
        }

        let wire_keys: Vec<String> = by_wire_key.keys().cloned().collect();
        let found = self.protocol.bulk_get(&wire_keys).await?;

        let mut values = HashMap::with_capacity(found.len());
        for (wire_key, data) in found {
            if let Some(typed_keys) = by_wire_key.remove(&wire_key) {
                let value = self.transcoder.decode(&data)?;
                for key in typed_keys {
                    values.insert(key, value.clone());
                }
            }
        }
        Ok(values)
    }

    async fn set_async(&self, key: K, value: V) -> Result<bool> {
        let wire_key = self.wire_key(&key)?;
        let data = self.encode(&value)?;
        self.protocol
            .set(&wire_key, self.expiration_ms(), data)
            .await
    }

    // gets + cas, or add when the key is absent; a concurrent write retries.
    async fn set_with_mapper_async(
        &self,
        key: K,
        mapper: &dyn EntryMapper<K, V>,
        max_iterations: usize,
    ) -> Result<bool> {
        let wire_key = self.wire_key(&key)?;

        for attempt in 1..=max_iterations {
            let current = match self.protocol.gets(&wire_key).await? {
                Some((data, token)) => Some((self.transcoder.decode(&data)?, token)),
                None => None,
            };
            let Some(new_value) = mapper.map(&key, current.as_ref().map(|(value, _)| value)) else {
                return Ok(false);
            };
            let data = self.encode(&new_value)?;

            let stored = match current {
                Some((_, token)) => {
                    match self
                        .protocol
                        .cas(&wire_key, token, self.expiration_ms(), data)
                        .await?
                    {
                        CasResponse::Stored => true,
                        CasResponse::Exists => false,
                        CasResponse::NotFound => return Ok(false),
                    }
                }
                None => self.protocol.add(&wire_key, self.expiration_ms(), data).await?,
            };
            if stored {
                return Ok(true);
            }
            debug!(key = %wire_key, attempt, "concurrent write detected, retrying");
        }

        Ok(false)
    }

    async fn delete_async(&self, key: &K) -> Result<bool> {
        let wire_key = self.wire_key(key)?;
        self.protocol.delete(&wire_key).await
    }
}

impl<K, V, P: ?Sized, T> fmt::Debug for RemoteCache<K, V, P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCache")
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}
