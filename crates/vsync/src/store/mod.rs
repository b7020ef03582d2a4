//! Secret store clients
//!
//! The replicator only needs three operations from a store: list the
//! children of a container, read a leaf, and write a leaf. [`SecretStore`]
//! is that seam. Transport, authentication and retries are the
//! implementation's business.

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod vault;

use crate::path::{ChildEntry, DataAddress, ListingAddress};
use async_trait::async_trait;
use thiserror::Error;

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;
pub use vault::{VaultClient, VaultConfig};

/// A secret's key/value payload, moved as-is between stores
pub type SecretPayload = serde_json::Map<String, serde_json::Value>;

/// Errors returned by store clients
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether the request may succeed if sent again
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Config(_) => false,
        }
    }
}

/// A connection to one hierarchical secret store
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Immediate children of a container; `None` when absent or empty
    async fn list(&self, address: &ListingAddress) -> Result<Option<Vec<ChildEntry>>, StoreError>;

    /// Current payload of a leaf; `None` when not found
    async fn read(&self, address: &DataAddress) -> Result<Option<SecretPayload>, StoreError>;

    /// Store a payload at a leaf, replacing any current value
    async fn write(&self, address: &DataAddress, payload: &SecretPayload) -> Result<(), StoreError>;
}
