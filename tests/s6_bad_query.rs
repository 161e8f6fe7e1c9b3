// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use spectre::{Error, QueryEngine, QueryFilter, Storage, StorageConfig, StopSignal};
use std::sync::Arc;
use test_log::test;

/// S6: `end_ts < start_ts` is rejected immediately with `InvalidQuery`,
/// without touching any file.
#[test]
fn bad_query_rejected_immediately() -> spectre::Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = Arc::new(Storage::open(StorageConfig::new(dir.path()))?);
    let engine = QueryEngine::new(storage);

    let filter = QueryFilter::new(1000, 0);
    let err = engine.query(filter, &StopSignal::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)));

    Ok(())
}
