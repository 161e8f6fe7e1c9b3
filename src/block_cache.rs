// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::block::BlockMetadata;
use crate::event::ResourceEvent;
use crate::metrics::Metrics;
use quick_cache::sync::Cache;
use quick_cache::{Equivalent, Weighter};
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;

/// A decoded block plus its aggregated metadata, as stored in the cache.
#[derive(Clone)]
pub struct CachedBlock {
    pub events: Arc<Vec<ResourceEvent>>,
    pub metadata: Arc<BlockMetadata>,
}

#[derive(Clone, Eq, Hash, PartialEq)]
struct CacheKey(Arc<str>, u32);

impl Equivalent<CacheKey> for (&str, u32) {
    fn equivalent(&self, key: &CacheKey) -> bool {
        self.0 == key.0.as_ref() && self.1 == key.1
    }
}

#[derive(Clone)]
struct BlockWeighter;

impl Weighter<CacheKey, CachedBlock> for BlockWeighter {
    fn weight(&self, _: &CacheKey, block: &CachedBlock) -> u64 {
        block.metadata.uncompressed_length
    }
}

/// Process-wide LRU of decoded blocks keyed by `(file_name, block_id)`.
///
/// Safe for concurrent readers and writers; internally backed by
/// `quick_cache`'s sharded concurrent cache, the same crate the query
/// engine's predecessor used for its own block cache.
pub struct BlockCache {
    data: Cache<CacheKey, CachedBlock, BlockWeighter, rustc_hash::FxBuildHasher>,
    capacity: u64,
    metrics: Arc<Metrics>,
}

impl BlockCache {
    /// Creates a cache with roughly `bytes` of capacity, estimated by
    /// `uncompressed_length` per entry.
    #[must_use]
    pub fn with_capacity_bytes(bytes: u64, metrics: Arc<Metrics>) -> Self {
        use quick_cache::sync::DefaultLifecycle;

        let data = Cache::with(
            10_000,
            bytes,
            BlockWeighter,
            rustc_hash::FxBuildHasher::default(),
            DefaultLifecycle::default(),
        );

        Self {
            data,
            capacity: bytes,
            metrics,
        }
    }

    /// Cached bytes currently held.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.data.weight()
    }

    /// Cache capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Number of cached blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if no blocks are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Looks up a cached block, recording a hit or miss.
    #[must_use]
    pub fn get(&self, file_name: &str, block_id: u32) -> Option<CachedBlock> {
        let hit = self.data.get(&(file_name, block_id));
        if hit.is_some() {
            self.metrics.cache_hits.fetch_add(1, Relaxed);
        } else {
            self.metrics.cache_misses.fetch_add(1, Relaxed);
        }
        hit
    }

    /// Inserts a freshly decoded block. If the single entry exceeds
    /// capacity, the insertion is rejected and the caller proceeds
    /// uncached, per the component design.
    pub fn put(&self, file_name: Arc<str>, block_id: u32, block: CachedBlock) {
        if self.capacity == 0 || block.metadata.uncompressed_length > self.capacity {
            return;
        }

        self.metrics
            .cache_bytes_decompressed
            .fetch_add(block.metadata.uncompressed_length, Relaxed);

        // quick_cache does not expose an eviction hook; approximate from
        // the length delta around a weighted insert that should grow len.
        let len_before = self.data.len();
        self.data.insert(CacheKey(file_name, block_id), block);
        if self.data.len() <= len_before {
            self.metrics.cache_evictions.fetch_add(1, Relaxed);
        }
    }
}
