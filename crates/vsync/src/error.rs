//! Error types for replication runs
//!
//! Fatal errors end the run and surface as [`ReplicateError`]. Per-leaf
//! problems are [`TransferError`]s, which the walker either records in the
//! outcome or escalates depending on the failure policy. A run that stops
//! on a fatal error comes back as [`Aborted`], which keeps the outcome
//! recorded up to that point.

use crate::outcome::{FailureKind, ReplicationOutcome};
use crate::store::StoreError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which side of the replication a store sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
    Source,
    Destination,
}

impl StoreRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
        }
    }
}

impl fmt::Display for StoreRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Malformed mount names or path segments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Mount name cannot be empty")]
    EmptyMount,

    #[error("Leaf name cannot be empty")]
    EmptyLeaf,

    #[error("Invalid path segment: {0:?}")]
    InvalidSegment(String),
}

/// Failure to move a single leaf secret
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    /// Source read failed, or the secret vanished after it was listed
    #[error("read from {address} failed: {reason}")]
    Read { address: String, reason: String },

    /// Destination write failed
    #[error("write to {address} failed: {reason}")]
    Write { address: String, reason: String },
}

impl TransferError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Read { .. } => FailureKind::Read,
            Self::Write { .. } => FailureKind::Write,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Read { reason, .. } | Self::Write { reason, .. } => reason,
        }
    }
}

/// Errors that abort a whole replication run
#[derive(Error, Debug)]
pub enum ReplicateError {
    #[error("Failed to connect to {role} Vault at {addr}: {source}")]
    Connection {
        role: StoreRole,
        addr: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to list secrets at {address}: {source}")]
    List {
        path: String,
        address: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to replicate secret {path}: {source}")]
    Transfer {
        path: String,
        #[source]
        source: TransferError,
    },

    #[error("Invalid secret path: {0}")]
    Path(#[from] PathError),

    #[error("Replication cancelled")]
    Cancelled,

    #[error("Replication timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// A fatal error plus whatever the run did before it
#[derive(Error, Debug)]
#[error("{error}")]
pub struct Aborted {
    pub error: ReplicateError,
    /// Progress up to the abort, with `aborted` set; `None` when the walk
    /// never started (bad path, connection failure)
    pub outcome: Option<ReplicationOutcome>,
}

impl From<ReplicateError> for Aborted {
    fn from(error: ReplicateError) -> Self {
        Self { error, outcome: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_kind() {
        let read = TransferError::Read {
            address: "secret/data/app/db".to_string(),
            reason: "not found".to_string(),
        };
        assert_eq!(read.kind(), FailureKind::Read);
        assert_eq!(read.reason(), "not found");

        let write = TransferError::Write {
            address: "secret/data/app/db".to_string(),
            reason: "permission denied".to_string(),
        };
        assert_eq!(write.kind(), FailureKind::Write);
    }

    #[test]
    fn test_connection_error_message() {
        let err = ReplicateError::Connection {
            role: StoreRole::Destination,
            addr: "http://dr:8200".to_string(),
            source: StoreError::Transport("connection refused".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("destination"));
        assert!(msg.contains("http://dr:8200"));

        let aborted = Aborted::from(err);
        assert_eq!(aborted.to_string(), msg);
        assert!(aborted.outcome.is_none());
    }
}
