//! Replication entry point
//!
//! [`replicate`] connects to both Vault instances and walks the tree;
//! [`replicate_between`] does the walk over any pair of already-connected
//! stores. Both return [`Aborted`] on a fatal error, carrying the partial
//! outcome once the walk has started.

use crate::error::{Aborted, ReplicateError, StoreRole};
use crate::outcome::ReplicationOutcome;
use crate::path::{ContainerPath, Namespace};
use crate::store::{SecretStore, VaultClient, VaultConfig};
use crate::walker::{abort_run, TreeWalker, WalkOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// What to replicate and how, independent of how the stores are reached
#[derive(Debug, Clone, Default)]
pub struct ReplicationPlan {
    /// Mount to read from
    pub source: Namespace,
    /// Mount to write to
    pub destination: Namespace,
    /// Container to start from, relative to the mounts ("" for the whole mount)
    pub base_path: String,
    pub walk: WalkOptions,
    /// Abort the walk if it runs longer than this
    pub timeout: Option<Duration>,
}

/// Everything needed for one run between two Vault servers
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub source: VaultConfig,
    pub destination: VaultConfig,
    pub plan: ReplicationPlan,
}

/// Connect to both Vault servers and replicate the tree described by `config.plan`
pub async fn replicate(
    config: &ReplicateConfig,
    cancel: CancellationToken,
) -> Result<ReplicationOutcome, Aborted> {
    // Reject a malformed base path before touching the network
    ContainerPath::parse(&config.plan.base_path).map_err(ReplicateError::from)?;

    let source = connect(StoreRole::Source, &config.source, &cancel).await?;
    let destination = connect(StoreRole::Destination, &config.destination, &cancel).await?;

    info!(
        source = %config.source.addr,
        destination = %config.destination.addr,
        "Connected to both Vault servers"
    );

    replicate_between(Arc::new(source), Arc::new(destination), &config.plan, cancel).await
}

/// Replicate between two connected stores
pub async fn replicate_between(
    source: Arc<dyn SecretStore>,
    destination: Arc<dyn SecretStore>,
    plan: &ReplicationPlan,
    cancel: CancellationToken,
) -> Result<ReplicationOutcome, Aborted> {
    let root = ContainerPath::parse(&plan.base_path).map_err(ReplicateError::from)?;

    info!(
        path = %root,
        source_mount = %plan.source.mount(),
        destination_mount = %plan.destination.mount(),
        concurrency = plan.walk.concurrency,
        on_error = plan.walk.policy.leaf.as_str(),
        on_list_error = plan.walk.policy.listing.as_str(),
        dry_run = plan.walk.dry_run,
        "Starting replication"
    );

    // A timeout must not cancel the caller's token, only this run
    let run_token = cancel.child_token();
    let walker = TreeWalker::new(
        source,
        destination,
        plan.source.clone(),
        plan.destination.clone(),
        plan.walk.clone(),
        run_token.clone(),
    );

    // The outcome lives out here so a timeout does not lose it
    let mut outcome = ReplicationOutcome::new(plan.walk.dry_run);
    let walking = walker.walk_into(&root, &mut outcome);
    let result = match plan.timeout {
        Some(limit) => match tokio::time::timeout(limit, walking).await {
            Ok(result) => result,
            Err(_) => {
                run_token.cancel();
                Err(ReplicateError::TimedOut(limit))
            }
        },
        None => walking.await,
    };
    if let Err(error) = result {
        return Err(abort_run(error, outcome));
    }
    outcome.finish();

    info!(
        transferred = outcome.transferred,
        failed = outcome.failed(),
        containers = outcome.containers_listed,
        "Replication finished"
    );
    Ok(outcome)
}

async fn connect(
    role: StoreRole,
    config: &VaultConfig,
    cancel: &CancellationToken,
) -> Result<VaultClient, ReplicateError> {
    let connecting = VaultClient::connect(config.clone());
    let result = tokio::select! {
        _ = cancel.cancelled() => return Err(ReplicateError::Cancelled),
        result = connecting => result,
    };
    result.map_err(|source| ReplicateError::Connection {
        role,
        addr: config.addr.clone(),
        source,
    })
}
