// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::error::{Error, Result};
use std::io::{Read, Write};

/// Compression algorithm, persisted as the 8-byte ASCII tag in the block
/// file header.
///
/// `tag()` returns a `&'static [u8; 8]` rather than a variable-length
/// buffer, so a future algorithm with a name longer than 8 ASCII bytes is
/// a compile-time error at its `tag()` definition rather than a runtime
/// truncation question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    /// No compression. Used by tests that want byte-exact fixtures.
    None,

    /// DEFLATE via `flate2`, the gzip-equivalent default.
    #[cfg(feature = "gzip")]
    Gzip,

    /// LZ4 via `lz4_flex`.
    #[cfg(feature = "lz4")]
    Lz4,
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            #[cfg(feature = "gzip")]
            Self::Gzip => "gzip",
            #[cfg(feature = "lz4")]
            Self::Lz4 => "lz4",
        })
    }
}

impl CompressionAlgorithm {
    /// The 8-byte ASCII, null-padded tag written into the file header.
    #[must_use]
    pub fn tag(self) -> &'static [u8; 8] {
        match self {
            Self::None => b"none\0\0\0\0",
            #[cfg(feature = "gzip")]
            Self::Gzip => b"gzip\0\0\0\0",
            #[cfg(feature = "lz4")]
            Self::Lz4 => b"lz4\0\0\0\0\0",
        }
    }

    /// Resolves a header tag back into an algorithm this build supports.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedCompression`] if the tag does not match
    /// any algorithm compiled into this build.
    pub fn from_tag(tag: [u8; 8]) -> Result<Self> {
        match &tag {
            b"none\0\0\0\0" => Ok(Self::None),
            #[cfg(feature = "gzip")]
            b"gzip\0\0\0\0" => Ok(Self::Gzip),
            #[cfg(feature = "lz4")]
            b"lz4\0\0\0\0\0" => Ok(Self::Lz4),
            _ => Err(Error::UnsupportedCompression(tag)),
        }
    }

    /// Compresses `bytes` with this algorithm's default effort level.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the underlying compressor fails.
    pub fn compress(self, bytes: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(bytes.to_vec()),

            #[cfg(feature = "gzip")]
            Self::Gzip => {
                use flate2::{write::DeflateEncoder, Compression};
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(bytes)?;
                Ok(encoder.finish()?)
            }

            #[cfg(feature = "lz4")]
            Self::Lz4 => Ok(lz4_flex::compress_prepend_size(bytes)),
        }
    }

    /// Decompresses `bytes` that were produced by [`Self::compress`] with
    /// this same algorithm.
    ///
    /// # Errors
    /// Returns [`Error::Decompress`] if `bytes` is truncated or corrupt.
    pub fn decompress(self, bytes: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(bytes.to_vec()),

            #[cfg(feature = "gzip")]
            Self::Gzip => {
                use flate2::read::DeflateDecoder;
                let mut decoder = DeflateDecoder::new(bytes);
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(|_| Error::Decompress(self))?;
                Ok(out)
            }

            #[cfg(feature = "lz4")]
            Self::Lz4 => {
                lz4_flex::decompress_size_prepended(bytes).map_err(|_| Error::Decompress(self))
            }
        }
    }
}

impl Default for CompressionAlgorithm {
    fn default() -> Self {
        #[cfg(feature = "gzip")]
        {
            Self::Gzip
        }
        #[cfg(not(feature = "gzip"))]
        {
            Self::None
        }
    }
}

/// True iff `compressed_len` represents a worthwhile reduction:
/// `compressed_len < 0.9 * original_len` and `original_len > 0`.
///
/// Reported as a metric only (the 10% check is never used to decide
/// whether to skip compression on ingest).
#[must_use]
pub fn is_effective(original_len: usize, compressed_len: usize) -> bool {
    original_len > 0 && (compressed_len as f64) < 0.9 * (original_len as f64)
}
