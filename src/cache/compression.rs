//! Payload Compression
//!
//! Articles are compressed once, right after the origin fetch, and then stored
//! and served in compressed form. The engine never decompresses.
//!
//! # Example
//!
//! ```
//! use cdn_replica::cache::compression::{Compressor, GzipCompressor};
//!
//! let gzip = GzipCompressor::new();
//! let compressed = gzip.compress(b"<html>Albert Einstein</html>").unwrap();
//! assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
//! ```

use std::io::Write;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

// =============================================================================
// Compression Algorithm
// =============================================================================

/// Supported content encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionAlgorithm {
    /// Stored as fetched
    None,
    /// gzip (RFC 1952)
    #[default]
    Gzip,
}

impl CompressionAlgorithm {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Gzip => "gzip",
        }
    }

    /// Value for the HTTP `Content-Encoding` header, if any
    pub fn content_encoding(&self) -> Option<&'static str> {
        match self {
            CompressionAlgorithm::None => None,
            CompressionAlgorithm::Gzip => Some("gzip"),
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Compressor Trait
// =============================================================================

/// Deterministic byte-stream transform applied to fetched payloads
pub trait Compressor: Send + Sync {
    /// Get the algorithm identifier
    fn algorithm(&self) -> CompressionAlgorithm;

    /// Compress data
    fn compress(&self, data: &[u8]) -> Result<Bytes>;
}

// =============================================================================
// No-Op Compressor
// =============================================================================

/// Pass-through compressor (no compression)
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::None
    }

    fn compress(&self, data: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }
}

// =============================================================================
// Gzip Compressor
// =============================================================================

/// gzip compressor
pub struct GzipCompressor {
    level: u32,
}

impl GzipCompressor {
    /// Create new gzip compressor with the default level (6)
    pub fn new() -> Self {
        Self {
            level: Compression::default().level(),
        }
    }

    /// Create with custom compression level (0-9)
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for GzipCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Gzip
    }

    fn compress(&self, data: &[u8]) -> Result<Bytes> {
        let failed = |e: std::io::Error| Error::CompressionFailed {
            algorithm: "gzip".into(),
            reason: e.to_string(),
        };

        let mut encoder = GzEncoder::new(
            Vec::with_capacity(data.len() / 2),
            Compression::new(self.level),
        );
        encoder.write_all(data).map_err(failed)?;
        let compressed = encoder.finish().map_err(failed)?;
        Ok(Bytes::from(compressed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    const TEST_DATA: &[u8] = b"Hello, this is test data that should compress well. \
        It has some repetition: Hello, this is test data that should compress well.";

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_gzip_output_decodes() {
        let compressor = GzipCompressor::new();

        let compressed = compressor.compress(TEST_DATA).unwrap();
        assert!(compressed.len() < TEST_DATA.len());
        assert_eq!(gunzip(&compressed), TEST_DATA);
    }

    #[test]
    fn test_gzip_is_deterministic() {
        let compressor = GzipCompressor::with_level(9);
        assert_eq!(
            compressor.compress(TEST_DATA).unwrap(),
            compressor.compress(TEST_DATA).unwrap()
        );
    }

    #[test]
    fn test_gzip_empty_input() {
        let compressed = GzipCompressor::new().compress(b"").unwrap();
        assert!(!compressed.is_empty());
        assert!(gunzip(&compressed).is_empty());
    }

    #[test]
    fn test_noop_passthrough() {
        let compressed = NoopCompressor.compress(TEST_DATA).unwrap();
        assert_eq!(compressed.as_ref(), TEST_DATA);
    }

    #[test]
    fn test_content_encoding() {
        assert_eq!(CompressionAlgorithm::Gzip.content_encoding(), Some("gzip"));
        assert_eq!(CompressionAlgorithm::None.content_encoding(), None);
        assert_eq!(CompressionAlgorithm::default(), CompressionAlgorithm::Gzip);
        assert_eq!(format!("{}", CompressionAlgorithm::Gzip), "gzip");
    }
}
