//! Property-based tests for tree replication
//!
//! Generates random secret trees and checks that a replication run copies
//! exactly the leaves under the base path, whatever the concurrency.

mod common;

use common::{payload, plan_between};
use proptest::prelude::*;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vsync::{
    replicate_between, ContainerPath, FailureKind, MemoryStore, ReplicationOutcome, WalkOptions,
};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

/// Leaf paths one to four segments deep over a small alphabet, so that
/// containers are shared between leaves
fn leaf_paths() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(
        prop::collection::vec("[a-d]", 1..=4).prop_map(|segments| segments.join("/")),
        0..24,
    )
}

fn seeded_source(paths: &BTreeSet<String>) -> Arc<MemoryStore> {
    let store = MemoryStore::new().with_latency(Duration::from_millis(1));
    for (i, path) in paths.iter().enumerate() {
        store.insert("secret", path, payload(json!({"path": path, "n": i})));
    }
    Arc::new(store)
}

fn run(
    source: &Arc<MemoryStore>,
    destination: &Arc<MemoryStore>,
    base_path: &str,
    walk: WalkOptions,
) -> ReplicationOutcome {
    let plan = plan_between("secret", "replica", base_path, walk);
    runtime()
        .block_on(replicate_between(
            source.clone(),
            destination.clone(),
            &plan,
            CancellationToken::new(),
        ))
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_every_leaf_is_replicated(paths in leaf_paths(), concurrency in 1usize..=4) {
        let source = seeded_source(&paths);
        let destination = Arc::new(MemoryStore::new());
        let walk = WalkOptions { concurrency, ..WalkOptions::default() };

        let outcome = run(&source, &destination, "", walk);

        prop_assert!(outcome.is_clean());
        prop_assert_eq!(outcome.transferred, paths.len());
        prop_assert_eq!(destination.leaves("replica"), source.leaves("secret"));
        prop_assert!(source.peak_in_flight() <= concurrency);
        prop_assert!(destination.peak_in_flight() <= concurrency);
    }

    #[test]
    fn prop_only_subtree_is_replicated(paths in leaf_paths(), base in "[a-d]") {
        let source = seeded_source(&paths);
        let destination = Arc::new(MemoryStore::new());

        let outcome = run(&source, &destination, &base, WalkOptions::default());

        let prefix = format!("{}/", base);
        let expected: BTreeMap<_, _> = source
            .leaves("secret")
            .into_iter()
            .filter(|(path, _)| path.starts_with(&prefix))
            .collect();
        prop_assert!(outcome.is_clean());
        prop_assert_eq!(outcome.transferred, expected.len());
        prop_assert_eq!(destination.leaves("replica"), expected);
    }

    #[test]
    fn prop_single_write_failure_is_isolated(
        paths in leaf_paths().prop_filter("need a leaf", |p| !p.is_empty()),
        pick in any::<prop::sample::Index>(),
        concurrency in 1usize..=4,
    ) {
        let failing = pick.get(&paths.iter().collect::<Vec<_>>()).to_string();
        let source = seeded_source(&paths);
        let destination = Arc::new(MemoryStore::new());
        destination.fail_write("replica", &failing);
        let walk = WalkOptions { concurrency, ..WalkOptions::default() };

        let outcome = run(&source, &destination, "", walk);

        prop_assert_eq!(outcome.transferred, paths.len() - 1);
        prop_assert_eq!(outcome.failures.len(), 1);
        prop_assert_eq!(&outcome.failures[0].path, &failing);
        prop_assert_eq!(outcome.failures[0].kind, FailureKind::Write);

        let mut expected = source.leaves("secret");
        expected.remove(&failing);
        prop_assert_eq!(destination.leaves("replica"), expected);
    }

    #[test]
    fn prop_base_path_slashes_are_insignificant(
        segments in prop::collection::vec("[a-z0-9_-]{1,8}", 0..5),
    ) {
        let joined = segments.join("/");
        let plain = ContainerPath::parse(&joined).unwrap();
        prop_assert_eq!(&ContainerPath::parse(&format!("{}/", joined)).unwrap(), &plain);
        prop_assert_eq!(&ContainerPath::parse(&format!("/{}", joined)).unwrap(), &plain);
        prop_assert_eq!(plain.depth(), segments.len());
    }
}
