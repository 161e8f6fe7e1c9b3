// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::Relaxed;

/// Process-wide counters for the block cache, ingest pipeline, and query
/// engine. Threaded through as a shared `Arc<Metrics>` so every component
/// reports into the same set of counters.
#[derive(Debug, Default)]
pub struct Metrics {
    // --- BlockCache ---
    /// Cache lookups that found the block already resident.
    pub(crate) cache_hits: AtomicU64,
    /// Cache lookups that required a disk read and decompression.
    pub(crate) cache_misses: AtomicU64,
    /// Entries evicted to make room for a new insertion.
    pub(crate) cache_evictions: AtomicU64,
    /// Decompressed bytes produced by cache misses.
    pub(crate) cache_bytes_decompressed: AtomicU64,

    // --- IngestPipeline ---
    /// Events that passed validation and were handed to Storage.
    pub(crate) ingest_accepted: AtomicU64,
    /// Events dropped by the validator (`InvalidEvent`).
    pub(crate) ingest_dropped: AtomicU64,
    /// Times a producer blocked because the queue was full.
    pub(crate) ingest_queue_full_blocked: AtomicU64,
    /// Events discarded unwritten at shutdown once the grace period elapsed.
    pub(crate) ingest_lost_at_shutdown: AtomicU64,

    // --- QueryEngine ---
    /// Files considered across all queries.
    pub(crate) query_files_considered: AtomicU64,
    /// Blocks actually decoded and filtered.
    pub(crate) query_blocks_scanned: AtomicU64,
    /// Blocks excluded via inverted-index/time pruning.
    pub(crate) query_blocks_skipped: AtomicU64,
    /// Blocks that failed to decompress or decode and were skipped with a
    /// warning.
    pub(crate) query_blocks_failed: AtomicU64,
}

impl Metrics {
    /// Number of cache hits.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Relaxed)
    }

    /// Number of cache misses.
    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Relaxed)
    }

    /// Number of cache evictions.
    pub fn cache_evictions(&self) -> u64 {
        self.cache_evictions.load(Relaxed)
    }

    /// Total bytes decompressed on cache misses.
    pub fn cache_bytes_decompressed(&self) -> u64 {
        self.cache_bytes_decompressed.load(Relaxed)
    }

    /// Cache hit ratio in `[0.0, 1.0]`. `0.0` if there have been no lookups.
    #[allow(clippy::cast_precision_loss)]
    pub fn cache_hit_ratio(&self) -> f64 {
        let hits = self.cache_hits() as f64;
        let total = hits + self.cache_misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Events accepted into Storage.
    pub fn ingest_accepted(&self) -> u64 {
        self.ingest_accepted.load(Relaxed)
    }

    /// Events dropped by the validator.
    pub fn ingest_dropped(&self) -> u64 {
        self.ingest_dropped.load(Relaxed)
    }

    /// Times a producer blocked on a full queue.
    pub fn ingest_queue_full_blocked(&self) -> u64 {
        self.ingest_queue_full_blocked.load(Relaxed)
    }

    /// Events lost at shutdown once the grace period elapsed.
    pub fn ingest_lost_at_shutdown(&self) -> u64 {
        self.ingest_lost_at_shutdown.load(Relaxed)
    }

    /// Files considered across all queries so far.
    pub fn query_files_considered(&self) -> u64 {
        self.query_files_considered.load(Relaxed)
    }

    /// Blocks scanned (decoded and filtered) across all queries so far.
    pub fn query_blocks_scanned(&self) -> u64 {
        self.query_blocks_scanned.load(Relaxed)
    }

    /// Blocks skipped via index/time pruning across all queries so far.
    pub fn query_blocks_skipped(&self) -> u64 {
        self.query_blocks_skipped.load(Relaxed)
    }

    /// Blocks that failed to decode and were skipped with a warning.
    pub fn query_blocks_failed(&self) -> u64 {
        self.query_blocks_failed.load(Relaxed)
    }
}

/// A snapshot of counters relevant to a single query, returned alongside
/// its results.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QueryMetrics {
    /// Files considered for this query.
    pub files_considered: u64,
    /// Blocks scanned (decoded and filtered) for this query.
    pub blocks_scanned: u64,
    /// Blocks skipped via index/time pruning for this query.
    pub blocks_skipped: u64,
    /// Cache hits encountered while answering this query.
    pub cache_hits: u64,
    /// Cache misses encountered while answering this query.
    pub cache_misses: u64,
    /// Wall-clock execution time of the query.
    pub elapsed: std::time::Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering::Relaxed;
    use test_log::test;

    #[test]
    fn hit_ratio_with_no_lookups_is_zero() {
        let metrics = Metrics::default();
        assert_eq!(0.0, metrics.cache_hit_ratio());
    }

    #[test]
    fn hit_ratio_reflects_counters() {
        let metrics = Metrics::default();
        metrics.cache_hits.fetch_add(3, Relaxed);
        metrics.cache_misses.fetch_add(1, Relaxed);
        assert!((metrics.cache_hit_ratio() - 0.75).abs() < f64::EPSILON);
    }
}
