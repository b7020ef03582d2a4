//! Shared helpers for integration tests.

#![allow(dead_code)]

use serde_json::Value;
use vsync::{Mount, Namespace, ReplicationPlan, SecretPayload, WalkOptions};

/// Build a payload from a JSON object literal.
pub fn payload(value: Value) -> SecretPayload {
    value
        .as_object()
        .cloned()
        .expect("payload must be a JSON object")
}

/// Plan replicating `base_path` from mount `secret` to mount `secret`.
pub fn plan(base_path: &str, walk: WalkOptions) -> ReplicationPlan {
    plan_between("secret", "secret", base_path, walk)
}

/// Plan replicating `base_path` between two named mounts.
pub fn plan_between(src_mount: &str, dest_mount: &str, base_path: &str, walk: WalkOptions) -> ReplicationPlan {
    ReplicationPlan {
        source: Namespace::new(Mount::new(src_mount).unwrap()),
        destination: Namespace::new(Mount::new(dest_mount).unwrap()),
        base_path: base_path.to_string(),
        walk,
        timeout: None,
    }
}
