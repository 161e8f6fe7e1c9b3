// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{DecodeError, EncodeError};
use crate::compression::CompressionAlgorithm;

/// Errors that can occur while operating a [`crate::Storage`].
///
/// Per the error table in the component design, most failure kinds here are
/// local (dropped event, skipped block, rotated-aside file) and never reach
/// this type - `Error` is reserved for the subset that is surfaced to the
/// caller: query-entry rejection, fatal write-side I/O, and cancellation.
/// Anything recoverable at a finer grain (a skipped block, a dropped event)
/// is reported instead as a [`crate::Warning`] attached to the successful
/// response, never folded in here.
#[derive(Debug)]
pub enum Error {
    /// I/O error.
    Io(std::io::Error),

    /// Serialization of a fixed-layout structure failed.
    Encode(EncodeError),

    /// Deserialization of a fixed-layout structure failed.
    Decode(DecodeError),

    /// The index section or an event payload could not be parsed as JSON.
    Json(serde_json::Error),

    /// Decompression failed for an algorithm tag this build does support,
    /// i.e. the payload itself is corrupt rather than merely unsupported.
    Decompress(CompressionAlgorithm),

    /// A block file's compression tag does not name an algorithm this
    /// build was compiled with support for.
    UnsupportedCompression([u8; 8]),

    /// A file's header failed magic bytes or version validation.
    CorruptHeader,

    /// A file's footer failed checksum or magic-byte validation.
    CorruptFooter,

    /// A query's parameters were invalid (e.g. `start > end`, or a span
    /// wider than `max_query_span`).
    InvalidQuery(String),

    /// A query exceeded its deadline or was cancelled. Already-merged
    /// results at the time of cancellation are still returned.
    Cancelled,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
            Self::Json(e) => write!(f, "JSON error: {e}"),
            Self::Decompress(algo) => write!(f, "decompression failed (algorithm: {algo})"),
            Self::UnsupportedCompression(tag) => {
                let printable = String::from_utf8_lossy(tag);
                write!(f, "unsupported compression algorithm tag: {printable:?}")
            }
            Self::CorruptHeader => write!(f, "corrupt block file header"),
            Self::CorruptFooter => write!(f, "corrupt block file footer"),
            Self::InvalidQuery(msg) => write!(f, "invalid query: {msg}"),
            Self::Cancelled => write!(f, "query cancelled or timed out"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Spectre result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// A non-fatal condition encountered while answering a query: a skipped
/// block, a dropped event, a rotated-aside file. Attached to a successful
/// [`crate::query::QueryResponse`] rather than returned as an [`Error`] -
/// the component design requires that one bad file never loses a whole
/// query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A block file could not be opened (unsupported compression tag,
    /// corrupt header) and was skipped entirely.
    FileSkipped {
        /// File name relative to the data directory.
        file: String,
        /// Human-readable reason.
        reason: String,
    },

    /// A block's footer/header checksum or the block checksum itself
    /// failed, so the block was skipped.
    BlockSkipped {
        /// File name relative to the data directory.
        file: String,
        /// Block id within the file.
        block_id: u32,
        /// Human-readable reason.
        reason: String,
    },

    /// A single event inside an otherwise-valid block failed to decode
    /// and was skipped.
    EventSkipped {
        /// File name relative to the data directory.
        file: String,
        /// Block id within the file.
        block_id: u32,
        /// Human-readable reason.
        reason: String,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileSkipped { file, reason } => write!(f, "{file}: skipped file ({reason})"),
            Self::BlockSkipped {
                file,
                block_id,
                reason,
            } => write!(f, "{file}: skipped block {block_id} ({reason})"),
            Self::EventSkipped {
                file,
                block_id,
                reason,
            } => write!(f, "{file}: skipped event in block {block_id} ({reason})"),
        }
    }
}
