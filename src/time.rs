// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Gets the unix timestamp as a duration.
pub fn unix_timestamp() -> std::time::Duration {
    #[cfg(any(test, feature = "test-util"))]
    {
        if let Some(cell) = NOW_OVERRIDE.get() {
            if let Some(override_val) = *cell.lock().expect("lock is poisoned") {
                return override_val;
            }
        }
    }

    let now = std::time::SystemTime::now();

    #[expect(clippy::expect_used, reason = "trivial")]
    now.duration_since(std::time::SystemTime::UNIX_EPOCH)
        .expect("time went backwards")
}

#[cfg(any(test, feature = "test-util"))]
use std::sync::{Mutex, OnceLock};

#[cfg(any(test, feature = "test-util"))]
static NOW_OVERRIDE: OnceLock<Mutex<Option<std::time::Duration>>> = OnceLock::new();

/// Overrides the clock `unix_timestamp` reports, so hour rotation can be
/// driven deterministically from tests instead of waiting on the real clock.
/// `None` clears the override. Gated behind the `test-util` feature, which
/// integration tests under `tests/` enable via a self-referencing
/// `dev-dependencies` entry.
#[cfg(any(test, feature = "test-util"))]
pub fn set_unix_timestamp_for_test(value: Option<std::time::Duration>) {
    let cell = NOW_OVERRIDE.get_or_init(|| Mutex::new(None));
    *cell.lock().expect("lock is poisoned") = value;
}

/// An hourly bucket, identified by its UTC year/month/day/hour. Two
/// timestamps in the same wall-clock UTC hour map to the same `HourBucket`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HourBucket {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
}

impl HourBucket {
    /// Truncates a nanosecond Unix timestamp to its containing wall-clock
    /// UTC hour. This is the writer's rotation policy: the event's own
    /// timestamp does not matter, only the wall-clock hour in effect when
    /// `write_event` is invoked.
    #[must_use]
    pub fn from_unix_nanos(nanos: i64) -> Self {
        let dt = DateTime::<Utc>::from_timestamp(
            nanos.div_euclid(1_000_000_000),
            u32::try_from(nanos.rem_euclid(1_000_000_000)).unwrap_or(0),
        )
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).expect("epoch is valid"));

        Self {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
        }
    }

    /// Truncates the current wall-clock time to its containing hour.
    #[must_use]
    pub fn now() -> Self {
        #[allow(clippy::cast_possible_wrap)]
        let nanos = unix_timestamp().as_nanos() as i64;
        Self::from_unix_nanos(nanos)
    }

    /// The on-disk file name for this hour bucket: `YYYY-MM-DD-HH.bin`.
    #[must_use]
    pub fn file_name(self) -> String {
        format!(
            "{:04}-{:02}-{:02}-{:02}.bin",
            self.year, self.month, self.day, self.hour
        )
    }

    /// Parses a file name of the form `YYYY-MM-DD-HH.bin` (the `.bin`
    /// suffix is required; rotated-aside `.incomplete.*`/`.corrupted.*`
    /// files do not parse).
    #[must_use]
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".bin")?;
        let mut parts = stem.splitn(4, '-');

        let year = parts.next()?.parse().ok()?;
        let month = parts.next()?.parse().ok()?;
        let day = parts.next()?.parse().ok()?;
        let hour = parts.next()?.parse().ok()?;

        if parts.next().is_some() || !(0..24).contains(&hour) || !(1..=12).contains(&month) {
            return None;
        }

        Some(Self {
            year,
            month,
            day,
            hour,
        })
    }

    /// The bucket immediately preceding this one.
    #[must_use]
    pub fn previous(self) -> Self {
        let start_of_hour = chrono::NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .and_then(|d| d.and_hms_opt(self.hour, 0, 0))
            .expect("bucket was constructed from a valid date")
            .and_utc();

        let prev = start_of_hour - chrono::Duration::hours(1);

        Self {
            year: prev.year(),
            month: prev.month(),
            day: prev.day(),
            hour: prev.hour(),
        }
    }

    /// The bucket immediately following this one.
    #[must_use]
    pub fn next(self) -> Self {
        let start_of_hour = chrono::NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .and_then(|d| d.and_hms_opt(self.hour, 0, 0))
            .expect("bucket was constructed from a valid date")
            .and_utc();

        let next = start_of_hour + chrono::Duration::hours(1);

        Self {
            year: next.year(),
            month: next.month(),
            day: next.day(),
            hour: next.hour(),
        }
    }

    /// Nanosecond Unix timestamp of the first instant in this bucket.
    #[must_use]
    pub fn start_nanos(self) -> i64 {
        chrono::NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .and_then(|d| d.and_hms_opt(self.hour, 0, 0))
            .expect("bucket was constructed from a valid date")
            .and_utc()
            .timestamp_nanos_opt()
            .unwrap_or(0)
    }

    /// Nanosecond Unix timestamp of the first instant after this bucket.
    #[must_use]
    pub fn end_nanos(self) -> i64 {
        self.start_nanos() + 3_600_000_000_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn file_name_round_trip() {
        let bucket = HourBucket::from_unix_nanos(1_765_540_800_000_000_000);
        let name = bucket.file_name();
        assert_eq!(Some(bucket), HourBucket::parse_file_name(&name));
    }

    #[test]
    fn rejects_malformed_names() {
        assert_eq!(None, HourBucket::parse_file_name("garbage"));
        assert_eq!(None, HourBucket::parse_file_name("2025-13-01-00.bin"));
        assert_eq!(None, HourBucket::parse_file_name("2025-12-12-12.bin.incomplete.1"));
    }

    #[test]
    fn previous_crosses_day_boundary() {
        let bucket = HourBucket::parse_file_name("2025-03-02-00.bin").unwrap();
        assert_eq!(
            "2025-03-01-23.bin",
            bucket.previous().file_name()
        );
    }

    #[test]
    fn same_hour_truncates_together() {
        let a = HourBucket::from_unix_nanos(1_765_540_800_000_000_000);
        let b = HourBucket::from_unix_nanos(1_765_540_800_000_000_000 + 1_000_000_000);
        assert_eq!(a, b);
    }

    #[test]
    fn next_crosses_day_boundary() {
        let bucket = HourBucket::parse_file_name("2025-03-01-23.bin").unwrap();
        assert_eq!("2025-03-02-00.bin", bucket.next().file_name());
    }

    #[test]
    fn next_and_previous_are_inverses() {
        let bucket = HourBucket::parse_file_name("2025-06-15-10.bin").unwrap();
        assert_eq!(bucket, bucket.next().previous());
    }
}
