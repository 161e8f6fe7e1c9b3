// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::event::ResourceEvent;

/// Rejects events missing any required identity field or with a
/// non-positive timestamp. Operation is always recognized since
/// [`crate::event::Operation`] is a closed enum decoded from JSON, so there
/// is nothing further to check there.
pub(super) fn is_acceptable(event: &ResourceEvent) -> bool {
    event.is_valid()
}
