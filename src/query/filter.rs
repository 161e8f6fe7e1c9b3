// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::error::Warning;
use crate::event::{ResourceEvent, ResourceIdentity};
use crate::metrics::QueryMetrics;

/// A time-bounded, optionally filtered query against stored events.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// Inclusive lower bound, nanoseconds since the Unix epoch.
    pub start_ts: i64,
    /// Inclusive upper bound, nanoseconds since the Unix epoch.
    pub end_ts: i64,
    pub kind: Option<String>,
    pub namespace: Option<String>,
    pub group: Option<String>,
    pub version: Option<String>,
    pub limit: Option<usize>,
}

impl QueryFilter {
    #[must_use]
    pub fn new(start_ts: i64, end_ts: i64) -> Self {
        Self {
            start_ts,
            end_ts,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn kind(mut self, value: impl Into<String>) -> Self {
        self.kind = Some(value.into());
        self
    }

    #[must_use]
    pub fn namespace(mut self, value: impl Into<String>) -> Self {
        self.namespace = Some(value.into());
        self
    }

    #[must_use]
    pub fn group(mut self, value: impl Into<String>) -> Self {
        self.group = Some(value.into());
        self
    }

    #[must_use]
    pub fn version(mut self, value: impl Into<String>) -> Self {
        self.version = Some(value.into());
        self
    }

    #[must_use]
    pub fn limit(mut self, value: usize) -> Self {
        self.limit = Some(value);
        self
    }

    pub(super) fn matches(&self, event: &ResourceEvent) -> bool {
        event.timestamp >= self.start_ts
            && event.timestamp <= self.end_ts
            && self.matches_identity(&event.identity)
    }

    /// Checks the identity-shaped fields only (`kind`/`namespace`/`group`/
    /// `version`), with no timestamp component. Used both by
    /// [`Self::matches`] and to filter synthesized state-snapshot events,
    /// which carry a synthetic timestamp rather than an observed one.
    pub(super) fn matches_identity(&self, identity: &ResourceIdentity) -> bool {
        self.kind.as_deref().is_none_or(|k| k == identity.kind)
            && self
                .namespace
                .as_deref()
                .is_none_or(|n| n == identity.namespace)
            && self.group.as_deref().is_none_or(|g| g == identity.group)
            && self
                .version
                .as_deref()
                .is_none_or(|v| v == identity.version)
    }
}

/// The result of a query: matched events (real and synthesized), reporting
/// metrics, and any non-fatal warnings encountered along the way.
#[derive(Debug, Clone, Default)]
pub struct QueryResponse {
    pub events: Vec<ResourceEvent>,
    pub metrics: QueryMetrics,
    pub warnings: Vec<Warning>,
    /// `true` if the query returned early because its cancellation signal
    /// fired; `events` holds whatever had already been collected.
    pub cancelled: bool,
}
