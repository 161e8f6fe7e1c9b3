// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The unit of ingestion and storage: [`ResourceEvent`].

use serde::{Deserialize, Serialize};

/// One of the three recognized mutations to a Kubernetes resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        })
    }
}

/// Identity of a Kubernetes resource, stable across its entire lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Empty for cluster-scoped resources.
    pub namespace: String,
    pub name: String,
    pub uid: String,
}

impl ResourceIdentity {
    /// Returns `true` if every identity field required to be non-empty is
    /// non-empty (`namespace` is exempt for cluster-scoped resources).
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.group.is_empty()
            && !self.version.is_empty()
            && !self.kind.is_empty()
            && !self.name.is_empty()
            && !self.uid.is_empty()
    }

    /// Derived `group/version/kind/namespace/name` string, unique per
    /// logical resource across its entire lifetime and stable across
    /// restarts. Used as the key of the final-state map.
    #[must_use]
    pub fn resource_key(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.group, self.version, self.kind, self.namespace, self.name
        )
    }
}

/// The unit of ingestion and storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEvent {
    #[serde(flatten)]
    pub identity: ResourceIdentity,

    /// Nanoseconds since the Unix epoch. Monotonicity per-resource is not
    /// guaranteed.
    pub timestamp: i64,

    pub operation: Operation,

    /// Opaque, already-pruned resource payload. `None` for DELETE events
    /// once retained in a final-state map (cleared payload).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    /// Set by the query engine on events it synthesizes from carryover
    /// state; always `false` on events that were actually ingested.
    #[serde(default)]
    pub synthetic: bool,
}

impl ResourceEvent {
    /// `true` iff every invariant from the data model holds: identity
    /// fields non-empty except `namespace`, `timestamp > 0`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.identity.is_complete() && self.timestamp > 0
    }

    /// The derived resource key.
    #[must_use]
    pub fn resource_key(&self) -> String {
        self.identity.resource_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn identity() -> ResourceIdentity {
        ResourceIdentity {
            group: "apps".into(),
            version: "v1".into(),
            kind: "Deployment".into(),
            namespace: "default".into(),
            name: "nginx".into(),
            uid: "u1".into(),
        }
    }

    #[test]
    fn resource_key_format() {
        assert_eq!("apps/v1/Deployment/default/nginx", identity().resource_key());
    }

    #[test]
    fn cluster_scoped_allows_empty_namespace() {
        let mut id = identity();
        id.namespace.clear();
        assert!(id.is_complete());
    }

    #[test]
    fn missing_uid_is_incomplete() {
        let mut id = identity();
        id.uid.clear();
        assert!(!id.is_complete());
    }

    #[test]
    fn event_validity_requires_positive_timestamp() {
        let event = ResourceEvent {
            identity: identity(),
            timestamp: 0,
            operation: Operation::Create,
            payload: None,
            synthetic: false,
        };
        assert!(!event.is_valid());
    }

    #[test]
    fn serde_round_trip() {
        let event = ResourceEvent {
            identity: identity(),
            timestamp: 1000,
            operation: Operation::Create,
            payload: Some(serde_json::json!({"spec": {"replicas": 3}})),
            synthetic: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: ResourceEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }
}
