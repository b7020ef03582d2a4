//! In-memory KV v2 store
//!
//! Behaves like a Vault KV v2 mount from the replicator's point of view:
//! listings return immediate children with a trailing `/` on containers,
//! missing leaves read as not found, writes overwrite. Failures can be
//! injected per address and every call is recorded, which makes it the
//! backbone of the replication tests.

use super::{SecretPayload, SecretStore, StoreError};
use crate::path::{ChildEntry, DataAddress, ListingAddress};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

type Key = (String, String);

/// A call made against a [`MemoryStore`], with the full address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    List(String),
    Read(String),
    Write(String),
}

#[derive(Default)]
struct MemoryState {
    secrets: BTreeMap<Key, SecretPayload>,
    /// Keys that still show up in listings but read as not found
    ghosts: BTreeSet<Key>,
    failing_lists: HashSet<Key>,
    failing_reads: HashSet<Key>,
    failing_writes: HashSet<Key>,
    calls: Vec<StoreCall>,
}

/// Thread-safe in-memory secret store
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

fn key(mount: &str, path: &str) -> Key {
    (mount.trim_matches('/').to_string(), path.trim_matches('/').to_string())
}

fn container_key(mount: &str, path: &str) -> Key {
    let trimmed = path.trim_matches('/');
    let path = if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    };
    (mount.trim_matches('/').to_string(), path)
}

fn denied(address: impl std::fmt::Display) -> StoreError {
    StoreError::Status {
        status: 403,
        body: format!("permission denied: {}", address),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`, so concurrent requests overlap
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a payload at `path` under `mount`
    pub fn insert(&self, mount: &str, path: &str, payload: SecretPayload) {
        let k = key(mount, path);
        let mut state = self.state();
        state.ghosts.remove(&k);
        state.secrets.insert(k, payload);
    }

    /// Make `path` appear in listings but read as not found, like a secret
    /// deleted between the listing and the read
    pub fn insert_ghost(&self, mount: &str, path: &str) {
        let k = key(mount, path);
        let mut state = self.state();
        state.secrets.remove(&k);
        state.ghosts.insert(k);
    }

    /// Current payload at `path`, if any
    pub fn get(&self, mount: &str, path: &str) -> Option<SecretPayload> {
        self.state().secrets.get(&key(mount, path)).cloned()
    }

    /// All readable leaves under `mount`, keyed by relative path
    pub fn leaves(&self, mount: &str) -> BTreeMap<String, SecretPayload> {
        let mount = mount.trim_matches('/');
        self.state()
            .secrets
            .iter()
            .filter(|((m, _), _)| m == mount)
            .map(|((_, path), payload)| (path.clone(), payload.clone()))
            .collect()
    }

    /// Fail every listing of the container at `path`
    pub fn fail_list(&self, mount: &str, path: &str) {
        self.state().failing_lists.insert(container_key(mount, path));
    }

    /// Fail every read of the leaf at `path`
    pub fn fail_read(&self, mount: &str, path: &str) {
        self.state().failing_reads.insert(key(mount, path));
    }

    /// Fail every write to the leaf at `path`
    pub fn fail_write(&self, mount: &str, path: &str) {
        self.state().failing_writes.insert(key(mount, path));
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    /// Addresses listed so far, in order
    pub fn listed(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                StoreCall::List(address) => Some(address.clone()),
                _ => None,
            })
            .collect()
    }

    /// Addresses written so far, in order
    pub fn written(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                StoreCall::Write(address) => Some(address.clone()),
                _ => None,
            })
            .collect()
    }

    /// Highest number of calls that were in progress at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: StoreCall) -> InFlight<'_> {
        self.state().calls.push(call);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let guard = InFlight { counter: &self.in_flight };
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }
}

struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn list(&self, address: &ListingAddress) -> Result<Option<Vec<ChildEntry>>, StoreError> {
        let _guard = self.enter(StoreCall::List(address.to_string())).await;
        let state = self.state();

        let (mount, prefix) = container_key(address.mount(), address.path());
        if state.failing_lists.contains(&(mount.clone(), prefix.clone())) {
            return Err(denied(address));
        }

        let mut children = BTreeSet::new();
        for (m, path) in state.secrets.keys().chain(state.ghosts.iter()) {
            if *m != mount {
                continue;
            }
            let Some(rest) = path.strip_prefix(prefix.as_str()) else {
                continue;
            };
            match rest.find('/') {
                Some(idx) => children.insert(rest[..=idx].to_string()),
                None => children.insert(rest.to_string()),
            };
        }

        if children.is_empty() {
            return Ok(None);
        }
        Ok(Some(children.iter().map(|raw| ChildEntry::parse(raw)).collect()))
    }

    async fn read(&self, address: &DataAddress) -> Result<Option<SecretPayload>, StoreError> {
        let _guard = self.enter(StoreCall::Read(address.to_string())).await;
        let state = self.state();

        let k = key(address.mount(), address.path());
        if state.failing_reads.contains(&k) {
            return Err(denied(address));
        }
        Ok(state.secrets.get(&k).cloned())
    }

    async fn write(&self, address: &DataAddress, payload: &SecretPayload) -> Result<(), StoreError> {
        let _guard = self.enter(StoreCall::Write(address.to_string())).await;
        let mut state = self.state();

        let k = key(address.mount(), address.path());
        if state.failing_writes.contains(&k) {
            return Err(denied(address));
        }
        state.ghosts.remove(&k);
        state.secrets.insert(k, payload.clone());
        Ok(())
    }
}
