//! Result of a replication run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Stage at which a path failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Container could not be listed
    List,
    /// Leaf could not be read from the source
    Read,
    /// Leaf could not be written to the destination
    Write,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// One path that could not be replicated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Path relative to the mount
    pub path: String,
    pub kind: FailureKind,
    pub reason: String,
}

/// Counts and failures accumulated over one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationOutcome {
    /// Leaves written to the destination (or that would be, in a dry run)
    pub transferred: usize,
    /// Containers successfully listed on the source
    pub containers_listed: usize,
    /// Paths that failed, sorted by path once the run finishes
    pub failures: Vec<Failure>,
    /// Whether writes were skipped
    pub dry_run: bool,
    /// Fatal error that stopped the run early; the counts cover only the
    /// work done before it
    pub aborted: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ReplicationOutcome {
    pub fn new(dry_run: bool) -> Self {
        Self {
            transferred: 0,
            containers_listed: 0,
            failures: Vec::new(),
            dry_run,
            aborted: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record_transfer(&mut self) {
        self.transferred += 1;
    }

    pub fn record_listing(&mut self) {
        self.containers_listed += 1;
    }

    pub fn record_failure(&mut self, path: String, kind: FailureKind, reason: String) {
        self.failures.push(Failure { path, kind, reason });
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// True only when nothing failed and the run was not aborted
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.aborted.is_none()
    }

    /// Stamp the finish time and put failures in a stable order
    pub fn finish(&mut self) {
        self.failures
            .sort_by(|a, b| a.path.cmp(&b.path).then(a.kind.as_str().cmp(b.kind.as_str())));
        self.finished_at = Some(Utc::now());
    }

    /// Mark the run as stopped by a fatal error and finish it
    pub fn abort(&mut self, reason: String) {
        self.aborted = Some(reason);
        self.finish();
    }

    /// Wall-clock duration of the run (up to now if unfinished)
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Utc::now) - self.started_at
    }

    /// Human-readable report
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let seconds = self.elapsed().num_milliseconds() as f64 / 1000.0;

        if let Some(reason) = &self.aborted {
            let _ = writeln!(out, "Replication aborted: {}", reason);
            let _ = writeln!(
                out,
                "Before the abort: {} secrets {}, {} failed, {} containers listed ({:.2}s)",
                self.transferred,
                if self.dry_run { "would be transferred" } else { "transferred" },
                self.failed(),
                self.containers_listed,
                seconds
            );
        } else if self.dry_run {
            let _ = writeln!(
                out,
                "Dry run complete: {} secrets would be transferred, {} failed, {} containers listed ({:.2}s)",
                self.transferred,
                self.failed(),
                self.containers_listed,
                seconds
            );
        } else {
            let _ = writeln!(
                out,
                "Replication complete: {} secrets transferred, {} failed, {} containers listed ({:.2}s)",
                self.transferred,
                self.failed(),
                self.containers_listed,
                seconds
            );
        }

        if !self.failures.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Failed paths:");
            for failure in &self.failures {
                let _ = writeln!(
                    out,
                    "  {:<5}  {}: {}",
                    failure.kind.as_str(),
                    failure.path,
                    failure.reason
                );
            }
        }

        out
    }
}
