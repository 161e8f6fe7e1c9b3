// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod common;

use common::{at_hour, event, pin_clock, unpin_clock};
use spectre::{Operation, QueryEngine, QueryFilter, Storage, StorageConfig, StopSignal};
use std::sync::Arc;
use test_log::test;

const EVENTS_PER_KIND: i64 = 1000;

/// S2: 1000 Pod events followed by 1000 Service events in one hour, spread
/// across on the order of 200 blocks via a small block-size threshold.
/// Querying `kind=Pod` over the full hour must return exactly the 1000 Pod
/// events and must have skipped at least one block via index pruning (the
/// Service-only blocks).
#[test]
fn kind_filter_skip() -> spectre::Result<()> {
    let dir = tempfile::tempdir()?;
    pin_clock("2025-06-02-00");

    let storage = Arc::new(Storage::open(
        StorageConfig::new(dir.path()).block_size_bytes(2000),
    )?);

    for i in 0..EVENTS_PER_KIND {
        storage.write_event(event(
            "Pod",
            &format!("pod-{i}"),
            at_hour("2025-06-02-00", i + 1),
            Operation::Create,
        ))?;
    }
    for i in 0..EVENTS_PER_KIND {
        storage.write_event(event(
            "Service",
            &format!("svc-{i}"),
            at_hour("2025-06-02-00", EVENTS_PER_KIND + i + 1),
            Operation::Create,
        ))?;
    }
    storage.close()?;

    let engine = QueryEngine::new(storage);
    let filter = QueryFilter::new(at_hour("2025-06-02-00", 0), at_hour("2025-06-02-00", 3599))
        .kind("Pod");
    let response = engine.query(filter, &StopSignal::default())?;

    assert_eq!(EVENTS_PER_KIND as usize, response.events.len());
    assert!(response.events.iter().all(|e| e.identity.kind == "Pod"));
    assert!(
        response.metrics.blocks_skipped > 0,
        "expected index/time pruning to skip at least one Service-only block, skipped {}",
        response.metrics.blocks_skipped
    );

    unpin_clock();
    Ok(())
}
