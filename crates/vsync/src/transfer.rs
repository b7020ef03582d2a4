//! Copy a single leaf secret from source to destination

use crate::error::TransferError;
use crate::path::{LeafPath, Namespace};
use crate::store::SecretStore;
use tracing::{debug, info};

/// One read from the source, one write to the destination.
///
/// The payload is written exactly as read. A leaf that reads as not found
/// (deleted after it was listed) is a [`TransferError::Read`]. With
/// `dry_run` set the read still happens but nothing is written.
pub async fn transfer(
    source: &dyn SecretStore,
    destination: &dyn SecretStore,
    source_ns: &Namespace,
    dest_ns: &Namespace,
    leaf: &LeafPath,
    dry_run: bool,
) -> Result<(), TransferError> {
    let read_address = source_ns.read_address(leaf);
    let payload = match source.read(&read_address).await {
        Ok(Some(payload)) => payload,
        Ok(None) => {
            return Err(TransferError::Read {
                address: read_address.to_string(),
                reason: "secret not found at source (deleted after listing?)".to_string(),
            })
        }
        Err(e) => {
            return Err(TransferError::Read {
                address: read_address.to_string(),
                reason: e.to_string(),
            })
        }
    };

    let write_address = dest_ns.write_address(leaf);
    if dry_run {
        info!(path = %leaf, to = %write_address, keys = payload.len(), "Would replicate secret");
        return Ok(());
    }

    debug!(path = %leaf, from = %read_address, to = %write_address, "Writing secret");
    destination
        .write(&write_address, &payload)
        .await
        .map_err(|e| TransferError::Write {
            address: write_address.to_string(),
            reason: e.to_string(),
        })?;

    info!(path = %leaf, from = %read_address, to = %write_address, "Replicated secret");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::FailureKind;
    use crate::path::Mount;
    use crate::store::{MemoryStore, SecretPayload};
    use serde_json::json;

    fn payload(value: serde_json::Value) -> SecretPayload {
        value.as_object().cloned().unwrap()
    }

    fn namespaces() -> (Namespace, Namespace) {
        (
            Namespace::new(Mount::new("secret").unwrap()),
            Namespace::new(Mount::new("dr").unwrap()),
        )
    }

    #[tokio::test]
    async fn test_transfer_copies_payload_unchanged() {
        let source = MemoryStore::new();
        let destination = MemoryStore::new();
        let nested = payload(json!({
            "user": "a",
            "port": 5432,
            "tls": true,
            "replicas": ["r1", "r2"],
            "opts": {"timeout": null}
        }));
        source.insert("secret", "app/db", nested.clone());

        let (src_ns, dest_ns) = namespaces();
        let leaf = LeafPath::parse("app/db").unwrap();
        transfer(&source, &destination, &src_ns, &dest_ns, &leaf, false)
            .await
            .unwrap();

        assert_eq!(destination.get("dr", "app/db"), Some(nested));
        assert_eq!(destination.written(), vec!["dr/data/app/db".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_source_is_read_failure() {
        let source = MemoryStore::new();
        let destination = MemoryStore::new();
        source.insert_ghost("secret", "app/missing");

        let (src_ns, dest_ns) = namespaces();
        let leaf = LeafPath::parse("app/missing").unwrap();
        let err = transfer(&source, &destination, &src_ns, &dest_ns, &leaf, false)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Read);
        assert!(destination.written().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure() {
        let source = MemoryStore::new();
        let destination = MemoryStore::new();
        source.insert("secret", "app/locked", payload(json!({"k": "v"})));
        destination.fail_write("dr", "app/locked");

        let (src_ns, dest_ns) = namespaces();
        let leaf = LeafPath::parse("app/locked").unwrap();
        let err = transfer(&source, &destination, &src_ns, &dest_ns, &leaf, false)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Write);
        assert!(err.reason().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_dry_run_skips_write() {
        let source = MemoryStore::new();
        let destination = MemoryStore::new();
        source.insert("secret", "app/db", payload(json!({"k": "v"})));

        let (src_ns, dest_ns) = namespaces();
        let leaf = LeafPath::parse("app/db").unwrap();
        transfer(&source, &destination, &src_ns, &dest_ns, &leaf, true)
            .await
            .unwrap();

        assert!(destination.written().is_empty());
        assert!(destination.get("dr", "app/db").is_none());
    }
}
