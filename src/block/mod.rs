// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! [`Block`]: an immutable, compressed, length-prefixed sequence of
//! encoded events with aggregated metadata.

mod buffer;

pub use buffer::{EventBuffer, DEFAULT_TARGET_BLOCK_SIZE};

use crate::bloom::BloomFilter;
use crate::compression::CompressionAlgorithm;
use crate::error::Result;
use crate::event::ResourceEvent;
use byteorder::{BigEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Read;

/// Output of [`EventBuffer::finalize`]: compressed bytes plus the
/// aggregated metadata, still missing the file-relative `id`/`offset`
/// that only `BlockFile` can assign.
pub struct FinalizedBlock {
    pub compressed: Vec<u8>,
    pub uncompressed_length: u64,
    pub event_count: u32,
    pub timestamp_min: i64,
    pub timestamp_max: i64,
    pub kinds_set: BTreeSet<String>,
    pub namespaces_set: BTreeSet<String>,
    pub groups_set: BTreeSet<String>,
    pub bloom_kinds: BloomFilter,
    pub bloom_namespaces: BloomFilter,
    pub bloom_groups: BloomFilter,
}

/// Per-block metadata, persisted in a file's index section. Once
/// persisted, fields are frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockMetadata {
    /// Sequential within the file, starting at 0.
    pub id: u32,
    /// Byte position of the compressed payload in the file.
    pub offset: u64,
    /// Compressed length in bytes.
    pub length: u64,
    pub uncompressed_length: u64,
    pub event_count: u32,
    pub timestamp_min: i64,
    pub timestamp_max: i64,
    pub kinds_set: BTreeSet<String>,
    pub namespaces_set: BTreeSet<String>,
    pub groups_set: BTreeSet<String>,
    pub bloom_kinds: BloomFilter,
    pub bloom_namespaces: BloomFilter,
    pub bloom_groups: BloomFilter,
}

impl BlockMetadata {
    /// Consumes a [`FinalizedBlock`] (after its compressed bytes have been
    /// written out by the caller) into the persisted metadata record.
    #[must_use]
    pub fn from_finalized(finalized: FinalizedBlock, id: u32, offset: u64) -> Self {
        Self {
            id,
            offset,
            length: finalized.compressed.len() as u64,
            uncompressed_length: finalized.uncompressed_length,
            event_count: finalized.event_count,
            timestamp_min: finalized.timestamp_min,
            timestamp_max: finalized.timestamp_max,
            kinds_set: finalized.kinds_set,
            namespaces_set: finalized.namespaces_set,
            groups_set: finalized.groups_set,
            bloom_kinds: finalized.bloom_kinds,
            bloom_namespaces: finalized.bloom_namespaces,
            bloom_groups: finalized.bloom_groups,
        }
    }

    /// `true` iff `b.timestamp_max >= start` and `b.timestamp_min <= end`:
    /// the block's time range overlaps the query window.
    #[must_use]
    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        self.timestamp_max >= start && self.timestamp_min <= end
    }
}

/// Decodes a block's decompressed payload into its length-prefixed
/// sequence of JSON-encoded [`ResourceEvent`]s.
///
/// Individual malformed records are reported via the returned `Vec` of
/// decode errors rather than aborting the whole block, matching the
/// per-event `DecodeError` policy: skip the event, keep going.
///
/// # Errors
/// Returns an error only if the length-prefix framing itself is corrupt
/// (a length prefix pointing past the end of the buffer), which is
/// indistinguishable from a corrupt block and should be treated the same
/// as a decompression failure by the caller.
pub fn decode_events(bytes: &[u8]) -> Result<(Vec<ResourceEvent>, Vec<String>)> {
    let mut cursor = std::io::Cursor::new(bytes);
    let mut events = Vec::new();
    let mut decode_errors = Vec::new();

    while (cursor.position() as usize) < bytes.len() {
        let len = cursor.read_u32::<BigEndian>()? as usize;
        let mut buf = vec![0u8; len];
        cursor.read_exact(&mut buf)?;

        match serde_json::from_slice::<ResourceEvent>(&buf) {
            Ok(event) => {
                log::trace!("decoded event {}", event.resource_key());
                events.push(event);
            }
            Err(e) => {
                log::trace!("failed to decode event: {e}");
                decode_errors.push(e.to_string());
            }
        }
    }

    Ok((events, decode_errors))
}

/// Encodes a single event as its length-prefixed form ready for
/// [`EventBuffer::add_event`].
///
/// # Errors
/// Returns an error if the event cannot be serialized to JSON.
pub fn encode_event(event: &ResourceEvent) -> Result<Vec<u8>> {
    log::trace!("encoding event {}", event.resource_key());
    Ok(serde_json::to_vec(event)?)
}
