// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::FinalizedBlock;
use crate::bloom::{BloomFilter, TARGET_FP_RATE};
use crate::compression::CompressionAlgorithm;
use crate::error::Result;
use byteorder::{BigEndian, WriteBytesExt};
use std::collections::BTreeSet;

/// Default `EventBuffer` overflow threshold: 10 MiB uncompressed.
pub const DEFAULT_TARGET_BLOCK_SIZE: usize = 10 * 1024 * 1024;

/// A write-side accumulator holding encoded events for exactly one
/// not-yet-finalized block.
pub struct EventBuffer {
    encoded: Vec<u8>,
    event_count: u32,
    current_size: usize,
    target_block_size: usize,
    timestamp_min: i64,
    timestamp_max: i64,
    kinds_set: BTreeSet<String>,
    namespaces_set: BTreeSet<String>,
    groups_set: BTreeSet<String>,
    kind_keys: Vec<Vec<u8>>,
    namespace_keys: Vec<Vec<u8>>,
    group_keys: Vec<Vec<u8>>,
}

impl EventBuffer {
    #[must_use]
    pub fn new(target_block_size: usize) -> Self {
        Self {
            encoded: Vec::new(),
            event_count: 0,
            current_size: 0,
            target_block_size,
            timestamp_min: i64::MAX,
            timestamp_max: i64::MIN,
            kinds_set: BTreeSet::new(),
            namespaces_set: BTreeSet::new(),
            groups_set: BTreeSet::new(),
            kind_keys: Vec::new(),
            namespace_keys: Vec::new(),
            group_keys: Vec::new(),
        }
    }

    /// Number of events accumulated so far.
    #[must_use]
    pub fn event_count(&self) -> u32 {
        self.event_count
    }

    /// `true` if no events have been added yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.event_count == 0
    }

    /// `event_count > 0 && current_size + next_event_size > target_block_size`.
    /// The first event never overflows, guaranteeing no empty block is
    /// ever finalized.
    #[must_use]
    pub fn would_overflow(&self, next_event_size: usize) -> bool {
        self.event_count > 0 && self.current_size + next_event_size > self.target_block_size
    }

    /// Appends an already-encoded event: a 4-byte big-endian length prefix
    /// followed by `encoded_bytes`. Updates aggregated metadata.
    pub fn add_event(
        &mut self,
        encoded_bytes: &[u8],
        kind: &str,
        group: &str,
        namespace: &str,
        timestamp: i64,
    ) {
        #[allow(clippy::cast_possible_truncation)]
        self.encoded
            .write_u32::<BigEndian>(encoded_bytes.len() as u32)
            .expect("writing to a Vec cannot fail");
        self.encoded.extend_from_slice(encoded_bytes);

        self.event_count += 1;
        self.current_size += encoded_bytes.len();
        self.timestamp_min = self.timestamp_min.min(timestamp);
        self.timestamp_max = self.timestamp_max.max(timestamp);

        if self.kinds_set.insert(kind.to_string()) {
            self.kind_keys.push(kind.as_bytes().to_vec());
        }
        if self.groups_set.insert(group.to_string()) {
            self.group_keys.push(group.as_bytes().to_vec());
        }
        if self.namespaces_set.insert(namespace.to_string()) {
            self.namespace_keys.push(namespace.as_bytes().to_vec());
        }
    }

    /// Serializes the accumulated events, compresses them, and constructs
    /// a [`FinalizedBlock`] with aggregated metadata. Consumes the buffer.
    ///
    /// # Errors
    /// Returns an error if compression fails (`CompressionError`), in
    /// which case the caller is expected to drop the buffer's events and
    /// count the loss as a metric, per the component design's failure
    /// semantics.
    pub fn finalize(self, algorithm: CompressionAlgorithm) -> Result<FinalizedBlock> {
        let uncompressed_length = self.encoded.len() as u64;
        let compressed = algorithm.compress(&self.encoded)?;

        let bloom_kinds = bloom_from_keys(&self.kind_keys);
        let bloom_namespaces = bloom_from_keys(&self.namespace_keys);
        let bloom_groups = bloom_from_keys(&self.group_keys);

        Ok(FinalizedBlock {
            compressed,
            uncompressed_length,
            event_count: self.event_count,
            timestamp_min: self.timestamp_min,
            timestamp_max: self.timestamp_max,
            kinds_set: self.kinds_set,
            namespaces_set: self.namespaces_set,
            groups_set: self.groups_set,
            bloom_kinds,
            bloom_namespaces,
            bloom_groups,
        })
    }
}

fn bloom_from_keys(keys: &[Vec<u8>]) -> BloomFilter {
    let mut filter = BloomFilter::with_fp_rate(keys.len(), TARGET_FP_RATE);
    for key in keys {
        filter.set(key);
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn first_event_never_overflows() {
        let buffer = EventBuffer::new(1);
        assert!(!buffer.would_overflow(1_000_000));
    }

    #[test]
    fn overflow_after_first_event() {
        let mut buffer = EventBuffer::new(10);
        buffer.add_event(b"12345", "Pod", "", "default", 1);
        assert!(buffer.would_overflow(10));
    }

    #[test]
    fn finalize_aggregates_metadata() {
        let mut buffer = EventBuffer::new(DEFAULT_TARGET_BLOCK_SIZE);
        buffer.add_event(b"{}", "Pod", "", "default", 100);
        buffer.add_event(b"{}", "Pod", "", "kube-system", 50);

        let finalized = buffer.finalize(CompressionAlgorithm::None).unwrap();
        assert_eq!(2, finalized.event_count);
        assert_eq!(50, finalized.timestamp_min);
        assert_eq!(100, finalized.timestamp_max);
        assert_eq!(1, finalized.kinds_set.len());
        assert_eq!(2, finalized.namespaces_set.len());
        assert!(finalized.bloom_kinds.contains(b"Pod"));
    }
}
