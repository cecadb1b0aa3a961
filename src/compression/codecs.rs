//! Codec implementations backing [`CompressionAlgorithm`](super::CompressionAlgorithm).

use std::io::{Read, Write};

use flate2::read::{DeflateDecoder, GzDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;

use super::Compressor;
use crate::error::{CacheError, Result};

/// Largest output any codec will decompress to.
pub const MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

fn compression_error(codec: &str, action: &str, err: impl std::fmt::Display) -> CacheError {
    CacheError::Compression(format!("failed {action} using {codec}: {err}"))
}

fn too_large(codec: &str, limit: usize) -> CacheError {
    compression_error(codec, "decompressing", format!("output exceeds {limit} bytes"))
}

/// Drains a decoder, failing once it yields more than `limit` bytes.
fn read_bounded(reader: impl Read, size_hint: usize, limit: usize, codec: &str) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(size_hint.min(limit));
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut buffer)
        .map_err(|e| compression_error(codec, "decompressing", e))?;
    if buffer.len() > limit {
        return Err(too_large(codec, limit));
    }
    Ok(buffer)
}

// == Gzip ==
/// Gzip with the default level.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
        encoder
            .write_all(data)
            .and_then(|_| encoder.finish())
            .map_err(|e| compression_error("gzip", "compressing", e))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        read_bounded(GzDecoder::new(data), data.len() * 2, MAX_DECOMPRESSED_SIZE, "gzip")
    }
}

// == Deflate ==
/// Raw deflate (no zlib/gzip framing) with a configurable level.
#[derive(Debug, Clone, Copy)]
pub struct DeflateCompressor {
    level: u32,
}

impl DeflateCompressor {
    /// Levels above 9 are clamped to 9.
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }
}

impl Compressor for DeflateCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        // Worst-case deflate output size for incompressible input.
        let estimate = data.len() + ((data.len() + 7) >> 3) + ((data.len() + 63) >> 6) + 5;
        let mut encoder = DeflateEncoder::new(Vec::with_capacity(estimate), Compression::new(self.level));
        encoder
            .write_all(data)
            .and_then(|_| encoder.finish())
            .map_err(|e| compression_error("deflate", "compressing", e))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        read_bounded(DeflateDecoder::new(data), data.len() * 2, MAX_DECOMPRESSED_SIZE, "deflate")
    }
}

// == LZ4 ==
/// LZ4 block format with the uncompressed size prepended.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(data, None, true).map_err(|e| compression_error("lz4", "compressing", e))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let prefix: [u8; 4] = data
            .get(..4)
            .and_then(|prefix| prefix.try_into().ok())
            .ok_or_else(|| compression_error("lz4", "decompressing", "missing size prefix"))?;
        // The block decoder allocates whatever the prefix claims.
        let size = i32::from_le_bytes(prefix);
        if size < 0 || size as usize > MAX_DECOMPRESSED_SIZE {
            return Err(too_large("lz4", MAX_DECOMPRESSED_SIZE));
        }
        lz4::block::decompress(data, None).map_err(|e| compression_error("lz4", "decompressing", e))
    }
}

// == Zstandard ==
/// Zstandard frames; level 0 selects zstd's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Compressor for ZstdCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::encode_all(data, self.level).map_err(|e| compression_error("zstd", "compressing", e))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let decoder = zstd::stream::read::Decoder::new(data)
            .map_err(|e| compression_error("zstd", "decompressing", e))?;
        read_bounded(decoder, data.len() * 4, MAX_DECOMPRESSED_SIZE, "zstd")
    }
}
