// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! [`Storage`]: owns hour rotation and write serialization. Exactly one
//! thread calls [`Storage::write_event`] - readers never synchronize with
//! the writer; they observe sealed files plus a published snapshot of the
//! Open file.

use crate::block_cache::BlockCache;
use crate::config::StorageConfig;
use crate::error::Result;
use crate::event::ResourceEvent;
use crate::file::{BlockFile, OpenFileSnapshot};
use crate::final_state::FinalStateMap;
use crate::metrics::Metrics;
use crate::time::HourBucket;
use std::sync::{Arc, Mutex, MutexGuard};

struct OpenState {
    file: BlockFile,
    hour: HourBucket,
}

/// Owns hour rotation, file handle lifecycle, and write serialization for
/// one data directory.
pub struct Storage {
    data_dir: std::path::PathBuf,
    config: StorageConfig,
    open: Mutex<Option<OpenState>>,
    cache: Arc<BlockCache>,
    metrics: Arc<Metrics>,
}

impl Storage {
    /// Opens (or prepares to lazily create) storage rooted at
    /// `config.data_dir()`. The first call to [`Self::write_event`]
    /// creates or reopens the current hour's file.
    ///
    /// # Errors
    /// Returns [`Error::Io`](crate::Error::Io) if `data_dir` cannot be
    /// created.
    pub fn open(config: StorageConfig) -> Result<Self> {
        std::fs::create_dir_all(config.data_dir())?;

        let metrics = Arc::new(Metrics::default());
        let cache = Arc::new(BlockCache::with_capacity_bytes(
            config.cache_max_bytes,
            metrics.clone(),
        ));

        Ok(Self {
            data_dir: config.data_dir().to_path_buf(),
            config,
            open: Mutex::new(None),
            cache,
            metrics,
        })
    }

    #[must_use]
    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<BlockCache> {
        &self.cache
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    #[must_use]
    pub fn max_query_span(&self) -> std::time::Duration {
        self.config.max_query_span
    }

    /// Writes one event: computes the writer's current wall-clock hour,
    /// rotates if it has changed since the last write, and forwards to
    /// the Open file.
    ///
    /// # Errors
    /// Propagates [`BlockFile::write_event`] failures.
    pub fn write_event(&self, event: ResourceEvent) -> Result<()> {
        let hour = HourBucket::now();
        let mut guard = self.open.lock().expect("open file lock poisoned");

        let needs_rotation = !matches!(&*guard, Some(state) if state.hour == hour);
        if needs_rotation {
            self.rotate(&mut guard, hour)?;
        }

        let state = guard.as_mut().expect("rotation guarantees a state");
        state.file.write_event(event)
    }

    fn rotate(&self, guard: &mut MutexGuard<'_, Option<OpenState>>, hour: HourBucket) -> Result<()> {
        let carryover = match guard.take() {
            Some(mut old) => {
                old.file.close()?;
                log::debug!("rotated out {}", old.file.path().display());
                old.file.final_state_map().clone()
            }
            None => FinalStateMap::new(),
        };

        let path = self.data_dir.join(hour.file_name());
        let file = BlockFile::open(
            path,
            self.config.compression,
            carryover,
            self.config.block_size_bytes,
            self.config.fsync_on_block,
        )?;

        **guard = Some(OpenState { file, hour });
        Ok(())
    }

    /// Seals the current Open file, if any. Idempotent.
    ///
    /// # Errors
    /// Propagates [`BlockFile::close`] failures.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.open.lock().expect("open file lock poisoned");
        if let Some(state) = guard.as_mut() {
            state.file.close()?;
        }
        Ok(())
    }

    /// The current Open file's name, snapshot, and compression algorithm,
    /// if a file is open. Used by the query engine to consult the
    /// in-memory buffer and published block metadata without locking the
    /// writer for the duration of the query.
    #[must_use]
    pub fn open_file_snapshot(
        &self,
    ) -> Option<(String, OpenFileSnapshot, crate::compression::CompressionAlgorithm)> {
        let guard = self.open.lock().expect("open file lock poisoned");
        guard.as_ref().map(|state| {
            (
                state
                    .file
                    .path()
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string(),
                state.file.snapshot(),
                state.file.compression(),
            )
        })
    }
}
