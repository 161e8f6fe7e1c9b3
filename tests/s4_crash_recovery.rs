// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod common;

use common::{at_hour, event, pin_clock, unpin_clock};
use spectre::coding::Encode;
use spectre::file::header::{Header, FORMAT_VERSION};
use spectre::{CompressionAlgorithm, Operation, QueryEngine, QueryFilter, Storage, StorageConfig, StopSignal, Warning};
use std::sync::Arc;
use test_log::test;

/// S4: a file with a valid header but no footer - as a killed-mid-write
/// process would leave behind - is rotated aside the moment `Storage`
/// next needs that hour's file. A query over the affected window must
/// see only events from the replacement file, plus a warning naming the
/// rotated-aside sibling.
#[test]
fn crash_recovery() -> spectre::Result<()> {
    let dir = tempfile::tempdir()?;
    pin_clock("2025-06-04-12");

    let path = dir.path().join("2025-06-04-12.bin");
    std::fs::write(
        &path,
        Header {
            format_version: FORMAT_VERSION,
            compression: CompressionAlgorithm::None,
        }
        .encode_into_vec(),
    )?;

    let storage = Arc::new(Storage::open(StorageConfig::new(dir.path()))?);
    storage.write_event(event(
        "Deployment",
        "nginx",
        at_hour("2025-06-04-12", 30),
        Operation::Create,
    ))?;
    storage.close()?;

    let rotated_aside: Vec<_> = std::fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".incomplete."))
        .collect();
    assert_eq!(1, rotated_aside.len());

    let engine = QueryEngine::new(storage);
    let filter = QueryFilter::new(at_hour("2025-06-04-12", 0), at_hour("2025-06-04-12", 3599));
    let response = engine.query(filter, &StopSignal::default())?;

    assert_eq!(1, response.events.len());
    assert_eq!("nginx", response.events[0].identity.name);

    let saw_rotated_warning = response.warnings.iter().any(|w| {
        matches!(w, Warning::FileSkipped { file, .. } if file.contains(".incomplete."))
    });
    assert!(
        saw_rotated_warning,
        "expected a warning about the rotated-aside file, got {:?}",
        response.warnings
    );

    unpin_clock();
    Ok(())
}
