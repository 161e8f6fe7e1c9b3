// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! [`StorageConfig`]: the programmatic contract an out-of-scope CLI or
//! config-file loader is expected to populate and hand to
//! [`crate::Storage::open`].

use crate::block::DEFAULT_TARGET_BLOCK_SIZE;
use crate::compression::CompressionAlgorithm;
use std::path::PathBuf;
use std::time::Duration;

/// Default ingest queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default number of events drained per iteration.
pub const DEFAULT_DRAIN_BATCH_SIZE: usize = 100;

/// Default block cache capacity: 100 MiB.
pub const DEFAULT_CACHE_MAX_BYTES: u64 = 100 * 1024 * 1024;

/// Default maximum query span: 30 days.
pub const DEFAULT_MAX_QUERY_SPAN: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Default shutdown grace period.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Configuration for a [`crate::Storage`] instance. Every option has a
/// documented default; only `data_dir` is required.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub(crate) data_dir: PathBuf,
    pub(crate) block_size_bytes: usize,
    pub(crate) compression: CompressionAlgorithm,
    pub(crate) queue_capacity: usize,
    pub(crate) drain_batch_size: usize,
    pub(crate) cache_max_bytes: u64,
    pub(crate) max_query_span: Duration,
    pub(crate) shutdown_grace: Duration,
    pub(crate) fsync_on_block: bool,
}

impl StorageConfig {
    /// Creates a config pointed at `data_dir`, the only required option.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            block_size_bytes: DEFAULT_TARGET_BLOCK_SIZE,
            compression: CompressionAlgorithm::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            drain_batch_size: DEFAULT_DRAIN_BATCH_SIZE,
            cache_max_bytes: DEFAULT_CACHE_MAX_BYTES,
            max_query_span: DEFAULT_MAX_QUERY_SPAN,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            fsync_on_block: false,
        }
    }

    /// `EventBuffer` overflow threshold. Recommended range `[1 MiB, 100 MiB]`.
    #[must_use]
    pub fn block_size_bytes(mut self, value: usize) -> Self {
        self.block_size_bytes = value;
        self
    }

    /// Compression algorithm written to new file headers.
    #[must_use]
    pub fn compression(mut self, value: CompressionAlgorithm) -> Self {
        self.compression = value;
        self
    }

    /// Ingest queue bound; producers block once full.
    #[must_use]
    pub fn queue_capacity(mut self, value: usize) -> Self {
        self.queue_capacity = value;
        self
    }

    /// Max events drained per iteration of the single drain worker.
    #[must_use]
    pub fn drain_batch_size(mut self, value: usize) -> Self {
        self.drain_batch_size = value;
        self
    }

    /// Block cache memory limit in bytes.
    #[must_use]
    pub fn cache_max_bytes(mut self, value: u64) -> Self {
        self.cache_max_bytes = value;
        self
    }

    /// Widest window a query may request before `InvalidQuery`.
    #[must_use]
    pub fn max_query_span(mut self, value: Duration) -> Self {
        self.max_query_span = value;
        self
    }

    /// Max time the drain worker is given to empty the queue at shutdown.
    #[must_use]
    pub fn shutdown_grace(mut self, value: Duration) -> Self {
        self.shutdown_grace = value;
        self
    }

    /// Whether to `fsync` after each block append.
    #[must_use]
    pub fn fsync_on_block(mut self, value: bool) -> Self {
        self.fsync_on_block = value;
        self
    }

    #[must_use]
    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }
}
