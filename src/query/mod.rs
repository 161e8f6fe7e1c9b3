// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! [`QueryEngine`]: file selection, index-driven block pruning, cached
//! decode, in-block filtering, state-snapshot synthesis, merge/sort/limit.

mod engine;
mod filter;

pub use engine::QueryEngine;
pub use filter::{QueryFilter, QueryResponse};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::event::{Operation, ResourceEvent, ResourceIdentity};
    use crate::storage::Storage;
    use crate::stop_signal::StopSignal;
    use crate::time::{self, HourBucket};
    use std::sync::Arc;
    use test_log::test;

    fn identity(name: &str) -> ResourceIdentity {
        ResourceIdentity {
            group: "apps".into(),
            version: "v1".into(),
            kind: "Deployment".into(),
            namespace: "default".into(),
            name: name.into(),
            uid: format!("uid-{name}"),
        }
    }

    fn event(name: &str, ts: i64, op: Operation) -> ResourceEvent {
        ResourceEvent {
            identity: identity(name),
            timestamp: ts,
            operation: op,
            payload: Some(serde_json::json!({"replicas": 1})),
            synthetic: false,
        }
    }

    fn at_hour(hour: &str, offset_secs: i64) -> i64 {
        let bucket = HourBucket::parse_file_name(&format!("{hour}.bin")).unwrap();
        bucket.start_nanos() + offset_secs * 1_000_000_000
    }

    #[test]
    fn single_event_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        time::set_unix_timestamp_for_test(Some(std::time::Duration::from_secs(
            at_hour("2025-01-01-00", 0) as u64 / 1_000_000_000,
        )));

        let storage = Arc::new(Storage::open(StorageConfig::new(dir.path())).unwrap());
        storage
            .write_event(event("nginx", at_hour("2025-01-01-00", 5), Operation::Create))
            .unwrap();
        storage.close().unwrap();

        let engine = QueryEngine::new(storage);
        let filter = QueryFilter::new(at_hour("2025-01-01-00", 0), at_hour("2025-01-01-00", 3600));
        let response = engine.query(filter, &StopSignal::default()).unwrap();

        assert_eq!(1, response.events.len());
        assert!(!response.events[0].synthetic);
        assert_eq!("nginx", response.events[0].identity.name);
        assert_eq!(1, response.metrics.blocks_scanned);

        time::set_unix_timestamp_for_test(None);
    }

    #[test]
    fn kind_filter_excludes_other_kinds() {
        let dir = tempfile::tempdir().unwrap();
        time::set_unix_timestamp_for_test(Some(std::time::Duration::from_secs(
            at_hour("2025-01-01-00", 0) as u64 / 1_000_000_000,
        )));

        let storage = Arc::new(Storage::open(StorageConfig::new(dir.path())).unwrap());
        storage
            .write_event(event("nginx", at_hour("2025-01-01-00", 5), Operation::Create))
            .unwrap();

        let mut service = event("redis", at_hour("2025-01-01-00", 6), Operation::Create);
        service.identity.kind = "Service".into();
        storage.write_event(service).unwrap();
        storage.close().unwrap();

        let engine = QueryEngine::new(storage);
        let filter = QueryFilter::new(at_hour("2025-01-01-00", 0), at_hour("2025-01-01-00", 3600))
            .kind("Deployment");
        let response = engine.query(filter, &StopSignal::default()).unwrap();

        assert_eq!(1, response.events.len());
        assert_eq!("Deployment", response.events[0].identity.kind);

        time::set_unix_timestamp_for_test(None);
    }

    #[test]
    fn carryover_produces_synthetic_state_event() {
        let dir = tempfile::tempdir().unwrap();

        time::set_unix_timestamp_for_test(Some(std::time::Duration::from_secs(
            at_hour("2025-01-01-10", 5) as u64 / 1_000_000_000,
        )));
        let storage = Arc::new(Storage::open(StorageConfig::new(dir.path())).unwrap());
        storage
            .write_event(event("nginx", at_hour("2025-01-01-10", 5), Operation::Create))
            .unwrap();
        storage.close().unwrap();

        time::set_unix_timestamp_for_test(Some(std::time::Duration::from_secs(
            at_hour("2025-01-01-11", 10) as u64 / 1_000_000_000,
        )));
        storage
            .write_event(event("unrelated", at_hour("2025-01-01-11", 10), Operation::Create))
            .unwrap();
        storage.close().unwrap();

        let engine = QueryEngine::new(storage);
        let filter = QueryFilter::new(
            at_hour("2025-01-01-11", 1800),
            at_hour("2025-01-01-11", 3599),
        );
        let response = engine.query(filter.clone(), &StopSignal::default()).unwrap();

        let synthetic: Vec<_> = response.events.iter().filter(|e| e.synthetic).collect();
        assert_eq!(1, synthetic.len());
        assert_eq!("nginx", synthetic[0].identity.name);
        assert_eq!(filter.start_ts, synthetic[0].timestamp);
        assert_eq!(Operation::Create, synthetic[0].operation);

        time::set_unix_timestamp_for_test(None);
    }

    #[test]
    fn bad_query_rejected_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::open(StorageConfig::new(dir.path())).unwrap());
        let engine = QueryEngine::new(storage);

        let filter = QueryFilter::new(1000, 0);
        let err = engine.query(filter, &StopSignal::default()).unwrap_err();
        assert!(matches!(err, crate::error::Error::InvalidQuery(_)));
    }

    #[test]
    fn repeated_query_increases_cache_hits() {
        let dir = tempfile::tempdir().unwrap();
        time::set_unix_timestamp_for_test(Some(std::time::Duration::from_secs(
            at_hour("2025-01-01-00", 0) as u64 / 1_000_000_000,
        )));

        let storage = Arc::new(Storage::open(StorageConfig::new(dir.path())).unwrap());
        storage
            .write_event(event("nginx", at_hour("2025-01-01-00", 5), Operation::Create))
            .unwrap();
        storage.close().unwrap();

        let engine = QueryEngine::new(storage);
        let filter = QueryFilter::new(at_hour("2025-01-01-00", 0), at_hour("2025-01-01-00", 3600));

        let first = engine.query(filter.clone(), &StopSignal::default()).unwrap();
        let second = engine.query(filter, &StopSignal::default()).unwrap();

        assert!(second.metrics.cache_hits > first.metrics.cache_hits);

        time::set_unix_timestamp_for_test(None);
    }
}
