//! vsync - Replicate KV secrets between Vault instances
//!
//! Walks the secret tree under a base path in a source Vault and writes
//! every leaf secret to the same relative path in a destination Vault.
//! Useful for disaster-recovery copies of a KV v2 mount.
//!
//! The pieces, leaf first:
//! - [`path`]: maps logical secret paths onto the KV v2 `metadata/` and
//!   `data/` address spaces
//! - [`store`]: the [`SecretStore`] seam plus the Vault client (and, with the
//!   `test-util` feature, an in-memory store for tests)
//! - [`transfer`]: moves one leaf secret
//! - [`walker`]: depth-first traversal over a bounded worker pool
//! - [`replicate`]: the entry point tying it together

pub mod config;
pub mod error;
pub mod outcome;
pub mod path;
pub mod replicate;
pub mod retry;
pub mod store;
pub mod transfer;
pub mod walker;

pub use config::{ConfigError, FileConfig};
pub use error::{Aborted, PathError, ReplicateError, StoreRole, TransferError};
pub use outcome::{Failure, FailureKind, ReplicationOutcome};
pub use path::{ChildEntry, ContainerPath, DataAddress, LeafPath, ListingAddress, Mount, Namespace};
pub use replicate::{replicate, replicate_between, ReplicateConfig, ReplicationPlan};
pub use retry::RetryConfig;
#[cfg(any(test, feature = "test-util"))]
pub use store::MemoryStore;
pub use store::{SecretPayload, SecretStore, StoreError, VaultClient, VaultConfig};
pub use walker::{FailurePolicy, PolicyMode, TreeWalker, WalkOptions};
