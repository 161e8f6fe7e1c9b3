// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use spectre::{HourBucket, Operation, ResourceEvent, ResourceIdentity};

/// A `Deployment/default/<name>` identity, unique per `name`.
pub fn identity(kind: &str, name: &str) -> ResourceIdentity {
    ResourceIdentity {
        group: "apps".into(),
        version: "v1".into(),
        kind: kind.into(),
        namespace: "default".into(),
        name: name.into(),
        uid: format!("uid-{name}"),
    }
}

pub fn event(kind: &str, name: &str, ts: i64, op: Operation) -> ResourceEvent {
    ResourceEvent {
        identity: identity(kind, name),
        timestamp: ts,
        operation: op,
        payload: Some(serde_json::json!({"spec": {"replicas": 1}})),
        synthetic: false,
    }
}

/// Nanosecond Unix timestamp `offset_secs` into the UTC hour named by
/// `hour`, e.g. `at_hour("2025-06-01-10", 5)`.
pub fn at_hour(hour: &str, offset_secs: i64) -> i64 {
    let bucket = HourBucket::parse_file_name(&format!("{hour}.bin")).expect("valid hour literal");
    bucket.start_nanos() + offset_secs * 1_000_000_000
}

/// Pins the clock `Storage` consults for hour rotation to the start of
/// `hour`, so a test can control which file its writes land in without
/// waiting on the real clock. Call with `None` to release the pin.
pub fn pin_clock(hour: &str) {
    let secs = at_hour(hour, 0) as u64 / 1_000_000_000;
    spectre::set_unix_timestamp_for_test(Some(std::time::Duration::from_secs(secs)));
}

pub fn unpin_clock() {
    spectre::set_unix_timestamp_for_test(None);
}
