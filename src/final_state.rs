// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! [`FinalStateMap`]: tracks the last seen state of each resource and
//! carries it across hour rotation (the **carryover**).

use crate::event::{Operation, ResourceEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The last observed operation + payload for a resource key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalStateEntry {
    pub uid: String,
    pub operation: Operation,
    pub last_timestamp: i64,
    /// Cleared (`None`) for DELETE entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Tracks the last seen state of every resource key, updated on every
/// write and serialized into the index section at close. Seeded at the
/// start of a new hourly file from the previous hour's sealed carryover.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinalStateMap(BTreeMap<String, FinalStateEntry>);

impl FinalStateMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the entry for `event`'s resource key. For DELETE operations
    /// the payload is cleared but the entry is retained, so queries can
    /// report "was deleted before or during this window" without
    /// consulting earlier files.
    pub fn update(&mut self, event: &ResourceEvent) {
        let payload = match event.operation {
            Operation::Delete => None,
            Operation::Create | Operation::Update => event.payload.clone(),
        };

        self.0.insert(
            event.resource_key(),
            FinalStateEntry {
                uid: event.identity.uid.clone(),
                operation: event.operation,
                last_timestamp: event.timestamp,
                payload,
            },
        );
    }

    #[must_use]
    pub fn get(&self, resource_key: &str) -> Option<&FinalStateEntry> {
        self.0.get(resource_key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FinalStateEntry)> {
        self.0.iter()
    }
}
