// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::event::ResourceEvent;

/// Strips `metadata.managedFields` from the payload, typically 80-90% of
/// its encoded size. Leaves identity fields untouched.
pub(super) fn prune(mut event: ResourceEvent) -> ResourceEvent {
    if let Some(metadata) = event
        .payload
        .as_mut()
        .and_then(|payload| payload.get_mut("metadata"))
        .and_then(|metadata| metadata.as_object_mut())
    {
        metadata.remove("managedFields");
    }

    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Operation, ResourceIdentity};
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
    fn strips_managed_fields_only() {
        let event = ResourceEvent {
            identity: identity(),
            timestamp: 1,
            operation: Operation::Create,
            payload: Some(serde_json::json!({
                "metadata": {
                    "managedFields": [{"manager": "kubectl"}],
                    "labels": {"app": "nginx"},
                },
                "spec": {"replicas": 1},
            })),
            synthetic: false,
        };

        let pruned = prune(event);
        let payload = pruned.payload.unwrap();
        assert!(payload["metadata"].get("managedFields").is_none());
        assert_eq!("nginx", payload["metadata"]["labels"]["app"]);
        assert_eq!(1, payload["spec"]["replicas"]);
        assert_eq!("nginx", pruned.identity.name);
    }

    #[test]
    fn missing_metadata_is_a_no_op() {
        let event = ResourceEvent {
            identity: identity(),
            timestamp: 1,
            operation: Operation::Create,
            payload: Some(serde_json::json!({"spec": {"replicas": 1}})),
            synthetic: false,
        };
        let pruned = prune(event);
        assert_eq!(1, pruned.payload.unwrap()["spec"]["replicas"]);
    }
}
