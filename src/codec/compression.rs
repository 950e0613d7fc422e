//! Gzip compression for frame payloads.
//!
//! The codec only needs a byte-sequence to byte-sequence codec pair; the
//! [`Compressor`] trait is that seam, and [`Gzip`] is the implementation the
//! peer speaks. Unlike channel-level compression there is no marker byte and
//! no size threshold: every encrypted frame is a complete gzip stream.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

use crate::error::CodecError;

/// Reversible byte-level compression.
pub trait Compressor: Send + Sync + std::fmt::Debug {
    /// Compress `data`.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Inverse of [`Compressor::compress`].
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Gzip (RFC 1952) compressor.
///
/// Decompression stops with an error once the output would exceed the
/// configured limit.
#[derive(Debug, Clone, Copy)]
pub struct Gzip {
    level: Compression,
    limit: usize,
}

impl Gzip {
    /// Create a compressor with the given level (clamped to 0-9).
    #[must_use]
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
            limit: crate::constants::DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Cap decompressed output at `limit` bytes.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

impl Default for Gzip {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_COMPRESSION_LEVEL)
    }
}

impl Compressor for Gzip {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 32), self.level);
        encoder.write_all(data).map_err(CodecError::Compress)?;
        encoder.finish().map_err(CodecError::Compress)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let cap = u64::try_from(self.limit).unwrap_or(u64::MAX).saturating_add(1);
        let mut decoder = GzDecoder::new(data).take(cap);
        let mut decompressed = Vec::with_capacity(data.len().saturating_mul(2).min(self.limit));
        decoder
            .read_to_end(&mut decompressed)
            .map_err(CodecError::Decompress)?;
        if decompressed.len() > self.limit {
            return Err(CodecError::Decompress(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame exceeds {} bytes once inflated", self.limit),
            )));
        }
        Ok(decompressed)
    }
}
