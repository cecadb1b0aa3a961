//! Value transcoders
//!
//! Turn typed values into the bytes stored remotely and back.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::compression::{CompressionAlgorithm, Compressor};
use crate::error::Result;

// == Transcoder ==
pub trait Transcoder<V>: Send + Sync {
    fn encode(&self, value: &V) -> Result<Bytes>;

    /// Fails with [`CacheError::Transcode`](crate::error::CacheError::Transcode)
    /// or [`CacheError::Compression`](crate::error::CacheError::Compression) on bad input.
    fn decode(&self, data: &[u8]) -> Result<V>;
}

impl<V, T> Transcoder<V> for Box<T>
where
    T: Transcoder<V> + ?Sized,
{
    fn encode(&self, value: &V) -> Result<Bytes> {
        (**self).encode(value)
    }

    fn decode(&self, data: &[u8]) -> Result<V> {
        (**self).decode(data)
    }
}

// == JSON Transcoder ==
/// Stores values as JSON documents.
pub struct JsonTranscoder<V> {
    _marker: PhantomData<fn() -> V>,
}

impl<V> JsonTranscoder<V> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<V> Default for JsonTranscoder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for JsonTranscoder<V> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for JsonTranscoder<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonTranscoder")
    }
}

impl<V> Transcoder<V> for JsonTranscoder<V>
where
    V: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &V) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn decode(&self, data: &[u8]) -> Result<V> {
        Ok(serde_json::from_slice(data)?)
    }
}

// == Compression Transcoder ==
/// Compresses the output of another transcoder.
#[derive(Debug, Clone)]
pub struct CompressionTranscoder<T> {
    inner: T,
    compressor: Arc<dyn Compressor>,
}

impl<T> CompressionTranscoder<T> {
    pub fn new(inner: T, algorithm: CompressionAlgorithm) -> Self {
        Self::with_compressor(inner, algorithm.compressor())
    }

    pub fn with_compressor(inner: T, compressor: Arc<dyn Compressor>) -> Self {
        Self { inner, compressor }
    }
}

impl<V, T> Transcoder<V> for CompressionTranscoder<T>
where
    T: Transcoder<V>,
{
    fn encode(&self, value: &V) -> Result<Bytes> {
        let raw = self.inner.encode(value)?;
        Ok(Bytes::from(self.compressor.compress(&raw)?))
    }

    fn decode(&self, data: &[u8]) -> Result<V> {
        let raw = self.compressor.decompress(data)?;
        self.inner.decode(&raw)
    }
}

/// JSON transcoder, compressed with `compression` when one is given.
pub fn json_transcoder<V>(compression: Option<CompressionAlgorithm>) -> Box<dyn Transcoder<V>>
where
    V: Serialize + DeserializeOwned + 'static,
{
    match compression {
        Some(algorithm) => Box::new(CompressionTranscoder::new(JsonTranscoder::new(), algorithm)),
        None => Box::new(JsonTranscoder::new()),
    }
}
