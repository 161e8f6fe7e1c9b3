// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::event::{Operation, ResourceEvent, ResourceIdentity};

/// A source-type notification, already reduced to identity, timestamp,
/// operation, and serialized payload by the caller's watcher integration.
/// Producing this from a cluster API's own watch event types is out of
/// scope here; this is the seam such an integration plugs into.
#[derive(Debug, Clone)]
pub struct RawNotification {
    pub identity: ResourceIdentity,
    /// Nanoseconds since the Unix epoch.
    pub timestamp: i64,
    pub operation: Operation,
    pub payload: Option<serde_json::Value>,
}

/// Copies identity, timestamp, and operation verbatim and marks the event
/// as not synthetic. Does not inspect or prune the payload; see
/// [`super::pruner::prune`].
pub(super) fn adapt(notification: RawNotification) -> ResourceEvent {
    ResourceEvent {
        identity: notification.identity,
        timestamp: notification.timestamp,
        operation: notification.operation,
        payload: notification.payload,
        synthetic: false,
    }
}
