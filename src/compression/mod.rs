//! Compression Module
//!
//! Pluggable byte codecs used to shrink values before they go on the wire.
//! The algorithm is picked once at construction; a store written with one
//! algorithm must be read back with the same one.

mod codecs;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{CacheError, Result};

pub use codecs::{
    DeflateCompressor, GzipCompressor, Lz4Compressor, ZstdCompressor, MAX_DECOMPRESSED_SIZE,
};

/// Default level used for `Deflate` when none is given.
pub const DEFAULT_DEFLATE_LEVEL: u32 = 6;

// == Compressor ==
/// A pure `compress` / `decompress` pair.
///
/// For every byte slice `b`, `decompress(compress(b)) == b`. Malformed input
/// to `decompress` fails with [`CacheError::Compression`].
pub trait Compressor: Send + Sync + fmt::Debug {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

// == Compression Algorithm ==
/// Selects one of the supported codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionAlgorithm {
    #[default]
    Gzip,
    Lz4,
    Zstd,
    /// Raw deflate with the given level (0-9)
    Deflate { level: u32 },
}

impl CompressionAlgorithm {
    /// Builds the codec for this algorithm.
    pub fn compressor(&self) -> Arc<dyn Compressor> {
        match *self {
            CompressionAlgorithm::Gzip => Arc::new(GzipCompressor),
            CompressionAlgorithm::Lz4 => Arc::new(Lz4Compressor),
            CompressionAlgorithm::Zstd => Arc::new(ZstdCompressor::default()),
            CompressionAlgorithm::Deflate { level } => Arc::new(DeflateCompressor::new(level)),
        }
    }

    /// Short lowercase name, as accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::Gzip => "gzip",
            CompressionAlgorithm::Lz4 => "lz4",
            CompressionAlgorithm::Zstd => "zstd",
            CompressionAlgorithm::Deflate { .. } => "deflate",
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionAlgorithm::Deflate { level } => write!(f, "deflate:{level}"),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = CacheError;

    /// Parses `gzip`, `lz4`, `zstd`, `deflate` or `deflate:<level>` (case-insensitive).
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        let (name, level) = match normalized.split_once(':') {
            Some((name, level)) => (name, Some(level)),
            None => (normalized.as_str(), None),
        };

        match (name, level) {
            ("gzip", None) => Ok(CompressionAlgorithm::Gzip),
            ("lz4", None) => Ok(CompressionAlgorithm::Lz4),
            ("zstd" | "zstandard", None) => Ok(CompressionAlgorithm::Zstd),
            ("deflate", None) => Ok(CompressionAlgorithm::Deflate {
                level: DEFAULT_DEFLATE_LEVEL,
            }),
            ("deflate", Some(level)) => match level.parse::<u32>() {
                Ok(level) if level <= 9 => Ok(CompressionAlgorithm::Deflate { level }),
                _ => Err(CacheError::Config(format!("invalid deflate level: {level}"))),
            },
            _ => Err(CacheError::Config(format!(
                "unknown compression algorithm: {s}"
            ))),
        }
    }
}
