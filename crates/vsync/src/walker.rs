//! Depth-first walk of the source secret tree
//!
//! Traversal uses an explicit work stack instead of call-stack recursion.
//! Work items (list a container, transfer a leaf) run on a bounded pool of
//! tokio tasks; the walk loop is the only place the outcome is updated.
//!
//! With `concurrency = 1` the walk is the plain sequential pre-order
//! traversal: children are handled in listing order, and a container's
//! subtree is finished before its next sibling starts.

use crate::error::{Aborted, ReplicateError, TransferError};
use crate::outcome::{FailureKind, ReplicationOutcome};
use crate::path::{ChildEntry, ChildPath, ContainerPath, LeafPath, ListingAddress, Namespace};
use crate::store::{SecretStore, StoreError};
use crate::transfer::transfer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default number of work items in flight
pub const DEFAULT_CONCURRENCY: usize = 4;

/// What to do when something fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyMode {
    /// Abort the whole run on the first failure
    #[default]
    FailFast,
    /// Record the failure and keep going
    BestEffort,
}

impl PolicyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FailFast => "fail-fast",
            Self::BestEffort => "best-effort",
        }
    }
}

/// Failure handling for listings and for leaf transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Leaf read/write failures
    pub leaf: PolicyMode,
    /// Container listing failures
    pub listing: PolicyMode,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            leaf: PolicyMode::BestEffort,
            listing: PolicyMode::FailFast,
        }
    }
}

impl FailurePolicy {
    /// Abort on any failure
    pub fn fail_fast() -> Self {
        Self {
            leaf: PolicyMode::FailFast,
            listing: PolicyMode::FailFast,
        }
    }

    /// Never abort; skip whatever fails
    pub fn best_effort() -> Self {
        Self {
            leaf: PolicyMode::BestEffort,
            listing: PolicyMode::BestEffort,
        }
    }
}

/// Walk settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOptions {
    /// Maximum work items in flight (each issues one request per store at a time)
    pub concurrency: usize,
    pub policy: FailurePolicy,
    /// Read leaves but skip writes
    pub dry_run: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            policy: FailurePolicy::default(),
            dry_run: false,
        }
    }
}

impl WalkOptions {
    /// One item at a time, in traversal order
    pub fn sequential() -> Self {
        Self {
            concurrency: 1,
            ..Default::default()
        }
    }
}

struct WalkContext {
    source: Arc<dyn SecretStore>,
    destination: Arc<dyn SecretStore>,
    source_ns: Namespace,
    dest_ns: Namespace,
    dry_run: bool,
    cancel: CancellationToken,
}

enum Work {
    Container(ContainerPath),
    Leaf(LeafPath),
}

enum Step {
    Listed {
        path: ContainerPath,
        children: Vec<ChildEntry>,
    },
    ListFailed {
        path: ContainerPath,
        address: ListingAddress,
        error: StoreError,
    },
    Transferred,
    TransferFailed {
        leaf: LeafPath,
        error: TransferError,
    },
    Cancelled,
}

/// Walks a source tree and copies every leaf to the destination
pub struct TreeWalker {
    ctx: Arc<WalkContext>,
    options: WalkOptions,
}

impl TreeWalker {
    pub fn new(
        source: Arc<dyn SecretStore>,
        destination: Arc<dyn SecretStore>,
        source_ns: Namespace,
        dest_ns: Namespace,
        options: WalkOptions,
        cancel: CancellationToken,
    ) -> Self {
        let ctx = WalkContext {
            source,
            destination,
            source_ns,
            dest_ns,
            dry_run: options.dry_run,
            cancel,
        };
        Self {
            ctx: Arc::new(ctx),
            options,
        }
    }

    /// Walk the tree under `root` and return the finished outcome.
    ///
    /// A fatal error comes back with the progress made before it.
    pub async fn walk(&self, root: &ContainerPath) -> Result<ReplicationOutcome, Aborted> {
        let mut outcome = ReplicationOutcome::new(self.options.dry_run);
        let result = self.walk_into(root, &mut outcome).await;
        match result {
            Ok(()) => {
                outcome.finish();
                Ok(outcome)
            }
            Err(e) => Err(abort_run(e, outcome)),
        }
    }

    /// Walk the tree under `root`, accumulating into `outcome`.
    ///
    /// On a fatal error `outcome` keeps whatever progress was made.
    pub async fn walk_into(
        &self,
        root: &ContainerPath,
        outcome: &mut ReplicationOutcome,
    ) -> Result<(), ReplicateError> {
        let limit = self.options.concurrency.max(1);
        let mut pending = vec![Work::Container(root.clone())];
        let mut in_flight: JoinSet<Step> = JoinSet::new();

        loop {
            while in_flight.len() < limit {
                let Some(work) = pending.pop() else {
                    break;
                };
                if self.ctx.cancel.is_cancelled() {
                    return Err(ReplicateError::Cancelled);
                }
                in_flight.spawn(run(self.ctx.clone(), work));
            }

            // Nothing in flight and nothing pending: the tree is exhausted
            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let step = joined.map_err(|e| ReplicateError::Worker(e.to_string()))?;
            self.apply(step, &mut pending, outcome)?;
        }

        Ok(())
    }

    fn apply(
        &self,
        step: Step,
        pending: &mut Vec<Work>,
        outcome: &mut ReplicationOutcome,
    ) -> Result<(), ReplicateError> {
        match step {
            Step::Listed { path, children } => {
                outcome.record_listing();
                info!(path = %path, children = children.len(), "Listed container");

                let mut discovered = Vec::with_capacity(children.len());
                for entry in &children {
                    match path.child(entry) {
                        Ok(ChildPath::Container(child)) => discovered.push(Work::Container(child)),
                        Ok(ChildPath::Leaf(child)) => discovered.push(Work::Leaf(child)),
                        Err(e) => {
                            let address = self.ctx.source_ns.listing_address(&path);
                            let error = StoreError::Decode(format!("listing returned {:?}: {}", entry.name, e));
                            self.listing_failed(path.clone(), address, error, outcome)?;
                        }
                    }
                }
                // Reversed so the first listed child is popped first
                pending.extend(discovered.into_iter().rev());
                Ok(())
            }
            Step::ListFailed {
                path,
                address,
                error,
            } => self.listing_failed(path, address, error, outcome),
            Step::Transferred => {
                outcome.record_transfer();
                Ok(())
            }
            Step::TransferFailed { leaf, error } => match self.options.policy.leaf {
                PolicyMode::FailFast => Err(ReplicateError::Transfer {
                    path: leaf.to_string(),
                    source: error,
                }),
                PolicyMode::BestEffort => {
                    warn!(path = %leaf, kind = error.kind().as_str(), error = %error, "Failed to replicate secret");
                    outcome.record_failure(leaf.to_string(), error.kind(), error.reason().to_string());
                    Ok(())
                }
            },
            Step::Cancelled => Err(ReplicateError::Cancelled),
        }
    }

    fn listing_failed(
        &self,
        path: ContainerPath,
        address: ListingAddress,
        error: StoreError,
        outcome: &mut ReplicationOutcome,
    ) -> Result<(), ReplicateError> {
        match self.options.policy.listing {
            PolicyMode::FailFast => Err(ReplicateError::List {
                path: path.to_string(),
                address: address.to_string(),
                source: error,
            }),
            PolicyMode::BestEffort => {
                warn!(path = %path, %address, error = %error, "Failed to list container, skipping subtree");
                outcome.record_failure(path.to_string(), FailureKind::List, error.to_string());
                Ok(())
            }
        }
    }
}

/// Close out a partial outcome after a fatal error
pub(crate) fn abort_run(error: ReplicateError, mut outcome: ReplicationOutcome) -> Aborted {
    error!(
        transferred = outcome.transferred,
        failed = outcome.failed(),
        error = %error,
        "Replication aborted"
    );
    outcome.abort(error.to_string());
    Aborted {
        error,
        outcome: Some(outcome),
    }
}

async fn run(ctx: Arc<WalkContext>, work: Work) -> Step {
    let cancel = ctx.cancel.clone();
    tokio::select! {
        _ = cancel.cancelled() => Step::Cancelled,
        step = execute(&ctx, work) => step,
    }
}

async fn execute(ctx: &WalkContext, work: Work) -> Step {
    match work {
        Work::Container(path) => {
            let address = ctx.source_ns.listing_address(&path);
            debug!(path = %path, %address, "Listing container");
            match ctx.source.list(&address).await {
                Ok(children) => Step::Listed {
                    path,
                    children: children.unwrap_or_default(),
                },
                Err(error) => Step::ListFailed {
                    path,
                    address,
                    error,
                },
            }
        }
        Work::Leaf(leaf) => {
            let result = transfer(
                ctx.source.as_ref(),
                ctx.destination.as_ref(),
                &ctx.source_ns,
                &ctx.dest_ns,
                &leaf,
                ctx.dry_run,
            )
            .await;
            match result {
                Ok(()) => Step::Transferred,
                Err(error) => Step::TransferFailed { leaf, error },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Mount;
    use crate::store::memory::StoreCall;
    use crate::store::{MemoryStore, SecretPayload};
    use serde_json::json;
    use std::time::Duration;

    fn payload(value: serde_json::Value) -> SecretPayload {
        value.as_object().cloned().unwrap()
    }

    fn walker(
        source: &Arc<MemoryStore>,
        destination: &Arc<MemoryStore>,
        options: WalkOptions,
        cancel: CancellationToken,
    ) -> TreeWalker {
        TreeWalker::new(
            source.clone(),
            destination.clone(),
            Namespace::new(Mount::new("secret").unwrap()),
            Namespace::new(Mount::new("secret").unwrap()),
            options,
            cancel,
        )
    }

    #[tokio::test]
    async fn test_sequential_walk_is_preorder() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        source.insert("secret", "a/x", payload(json!({"v": 1})));
        source.insert("secret", "a/sub/y", payload(json!({"v": 2})));
        source.insert("secret", "a/z", payload(json!({"v": 3})));
        source.insert("secret", "b", payload(json!({"v": 4})));

        let walker = walker(&source, &destination, WalkOptions::sequential(), CancellationToken::new());
        let outcome = walker.walk(&ContainerPath::root()).await.unwrap();

        assert_eq!(outcome.transferred, 4);
        assert_eq!(outcome.containers_listed, 3);
        assert_eq!(
            source.calls(),
            vec![
                StoreCall::List("secret/metadata/".into()),
                StoreCall::List("secret/metadata/a/".into()),
                StoreCall::List("secret/metadata/a/sub/".into()),
                StoreCall::Read("secret/data/a/sub/y".into()),
                StoreCall::Read("secret/data/a/x".into()),
                StoreCall::Read("secret/data/a/z".into()),
                StoreCall::Read("secret/data/b".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let source = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(5)));
        let destination = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(5)));
        for i in 0..20 {
            source.insert("secret", &format!("bulk/s{i:02}"), payload(json!({"i": i})));
        }

        let options = WalkOptions {
            concurrency: 3,
            ..Default::default()
        };
        let walker = walker(&source, &destination, options, CancellationToken::new());
        let outcome = walker.walk(&ContainerPath::root()).await.unwrap();

        assert_eq!(outcome.transferred, 20);
        assert!(source.peak_in_flight() <= 3);
        assert!(destination.peak_in_flight() <= 3);
        assert_eq!(destination.leaves("secret").len(), 20);
    }

    #[tokio::test]
    async fn test_list_failure_fail_fast() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        source.insert("secret", "app/db", payload(json!({"v": 1})));
        source.fail_list("secret", "app/");

        let walker = walker(&source, &destination, WalkOptions::sequential(), CancellationToken::new());
        let err = walker.walk(&ContainerPath::root()).await.unwrap_err();
        match err.error {
            ReplicateError::List { path, address, .. } => {
                assert_eq!(path, "app/");
                assert_eq!(address, "secret/metadata/app/");
            }
            other => panic!("Expected list error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_failure_best_effort_skips_subtree() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        source.insert("secret", "broken/db", payload(json!({"v": 1})));
        source.insert("secret", "fine/db", payload(json!({"v": 2})));
        source.fail_list("secret", "broken/");

        let options = WalkOptions {
            concurrency: 1,
            policy: FailurePolicy::best_effort(),
            dry_run: false,
        };
        let walker = walker(&source, &destination, options, CancellationToken::new());
        let outcome = walker.walk(&ContainerPath::root()).await.unwrap();

        assert_eq!(outcome.transferred, 1);
        assert_eq!(outcome.failed(), 1);
        assert_eq!(outcome.failures[0].kind, FailureKind::List);
        assert_eq!(outcome.failures[0].path, "broken/");
    }

    #[tokio::test]
    async fn test_leaf_failure_fail_fast() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        source.insert("secret", "app/a", payload(json!({"v": 1})));
        source.insert_ghost("secret", "app/b");
        source.insert("secret", "app/c", payload(json!({"v": 3})));

        let options = WalkOptions {
            concurrency: 1,
            policy: FailurePolicy::fail_fast(),
            dry_run: false,
        };
        let walker = walker(&source, &destination, options, CancellationToken::new());
        let err = walker.walk(&ContainerPath::root()).await.unwrap_err();

        assert!(matches!(err.error, ReplicateError::Transfer { ref path, .. } if path == "app/b"));
        // Sequential: app/c is never attempted
        assert_eq!(destination.written(), vec!["secret/data/app/a".to_string()]);
        assert_eq!(err.outcome.unwrap().transferred, 1);
    }

    #[tokio::test]
    async fn test_invalid_listing_key() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        source.insert("secret", "app/../db", payload(json!({"v": 1})));
        source.insert("secret", "app/ok", payload(json!({"v": 2})));

        let options = WalkOptions {
            concurrency: 1,
            policy: FailurePolicy::best_effort(),
            dry_run: false,
        };
        let walker = walker(&source, &destination, options, CancellationToken::new());
        let outcome = walker.walk(&ContainerPath::parse("app").unwrap()).await.unwrap();

        assert_eq!(outcome.transferred, 1);
        assert_eq!(outcome.failed(), 1);
        assert_eq!(outcome.failures[0].kind, FailureKind::List);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        source.insert("secret", "app/db", payload(json!({"v": 1})));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let walker = walker(&source, &destination, WalkOptions::sequential(), cancel);
        let err = walker.walk(&ContainerPath::root()).await.unwrap_err();

        assert!(matches!(err.error, ReplicateError::Cancelled));
        assert!(destination.written().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_walk() {
        let source = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(20)));
        let destination = Arc::new(MemoryStore::new());
        for i in 0..50 {
            source.insert("secret", &format!("app/s{i:02}"), payload(json!({"i": i})));
        }

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            trigger.cancel();
        });

        let walker = walker(&source, &destination, WalkOptions::sequential(), cancel);
        let err = walker.walk(&ContainerPath::root()).await.unwrap_err();

        assert!(matches!(err.error, ReplicateError::Cancelled));
        let written = destination.written().len();
        assert!(written < 50);
        let outcome = err.outcome.unwrap();
        assert_eq!(outcome.transferred, written);
        assert_eq!(outcome.aborted.as_deref(), Some("Replication cancelled"));
    }

    #[tokio::test]
    async fn test_abort_keeps_partial_outcome() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        source.insert("secret", "a/x", payload(json!({"v": 1})));
        source.insert_ghost("secret", "a/gone");
        source.insert("secret", "b/y", payload(json!({"v": 2})));
        source.fail_list("secret", "b/");

        let walker = walker(&source, &destination, WalkOptions::sequential(), CancellationToken::new());
        let err = walker.walk(&ContainerPath::root()).await.unwrap_err();

        assert!(matches!(err.error, ReplicateError::List { ref path, .. } if path == "b/"));
        let outcome = err.outcome.expect("walk started, outcome kept");
        assert_eq!(outcome.transferred, 1);
        assert_eq!(outcome.containers_listed, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].path, "a/gone");
        assert_eq!(outcome.failures[0].kind, FailureKind::Read);
        assert!(outcome.aborted.as_deref().unwrap().contains("secret/metadata/b/"));
        assert!(outcome.finished_at.is_some());
        assert!(!outcome.is_clean());
    }
}
