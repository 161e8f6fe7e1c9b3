// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod common;

use common::{at_hour, event, pin_clock, unpin_clock};
use spectre::{Operation, QueryEngine, QueryFilter, Storage, StorageConfig, StopSignal};
use std::sync::Arc;
use test_log::test;

/// S3: nginx is created in hour 10 and never touched again. Hour 11 has an
/// unrelated event so its file exists. A query over the back half of hour
/// 11 must synthesize exactly one state event for nginx, timestamped at
/// the window start.
#[test]
fn carryover_snapshot() -> spectre::Result<()> {
    let dir = tempfile::tempdir()?;

    pin_clock("2025-06-03-10");
    let storage = Arc::new(Storage::open(StorageConfig::new(dir.path()))?);
    storage.write_event(event(
        "Deployment",
        "nginx",
        at_hour("2025-06-03-10", 5),
        Operation::Create,
    ))?;
    storage.close()?;

    pin_clock("2025-06-03-11");
    storage.write_event(event(
        "Deployment",
        "unrelated",
        at_hour("2025-06-03-11", 10),
        Operation::Create,
    ))?;
    storage.close()?;

    let engine = QueryEngine::new(storage);
    let filter = QueryFilter::new(
        at_hour("2025-06-03-11", 1800),
        at_hour("2025-06-03-11", 3599),
    );
    let response = engine.query(filter.clone(), &StopSignal::default())?;

    let synthetic: Vec<_> = response.events.iter().filter(|e| e.synthetic).collect();
    assert_eq!(1, synthetic.len());
    assert_eq!("nginx", synthetic[0].identity.name);
    assert_eq!(filter.start_ts, synthetic[0].timestamp);
    assert_eq!(Operation::Create, synthetic[0].operation);

    unpin_clock();
    Ok(())
}
