// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Backends exercised through their trait objects

use std::{sync::Arc, time::Duration};

use backends::{
    CacheStore, ConfigStore, FileConfigStore, FixedWindowLimiter, MemoryCacheStore,
    MemoryPlanStore, PlanStore, PublicLimitConfig, PublicLimiter,
};
use bytes::Bytes;
use shared_types::{ChainSlug, Plan};

const CHAINS_V1: &str = r"
chains:
  - slug: eth
    chain_id: 1
    standard_nodes:
      - https://eth-a.node.example/
";

const CHAINS_V2: &str = r"
chains:
  - slug: eth
    chain_id: 1
    standard_nodes:
      - https://eth-b.node.example/
    archive_nodes:
      - https://eth-archive.node.example/
  - slug: base
    chain_id: 8453
    standard_nodes:
      - https://base.node.example/
";

#[tokio::test]
async fn file_edits_are_visible_on_next_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chains.yaml");
    std::fs::write(&path, CHAINS_V1).unwrap();

    let store: Arc<dyn ConfigStore> = Arc::new(FileConfigStore::new(&path));
    let eth = ChainSlug::new("eth").unwrap();
    let base = ChainSlug::new("base").unwrap();

    let first = store.get_chain_config(&eth).await.unwrap().unwrap();
    assert_eq!(first.standard_nodes[0].host_str(), Some("eth-a.node.example"));
    assert!(first.archive_nodes.is_empty());
    assert!(store.get_chain_config(&base).await.unwrap().is_none());

    std::fs::write(&path, CHAINS_V2).unwrap();

    let second = store.get_chain_config(&eth).await.unwrap().unwrap();
    assert_eq!(second.standard_nodes[0].host_str(), Some("eth-b.node.example"));
    assert_eq!(second.archive_nodes.len(), 1);
    assert_eq!(
        store.get_chain_config(&base).await.unwrap().unwrap().chain_id,
        8453
    );
}

#[tokio::test]
async fn broken_file_surfaces_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chains.yaml");
    std::fs::write(&path, "chains: [not, a, chain]").unwrap();

    let store = FileConfigStore::new(&path);
    assert!(
        store
            .get_chain_config(&ChainSlug::new("eth").unwrap())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn cache_store_tracks_statistics() {
    let memory = Arc::new(MemoryCacheStore::new(2));
    let store: Arc<dyn CacheStore> = memory.clone();

    tokio_test::assert_ok!(
        store
            .put("a", Bytes::from_static(b"1"), Duration::from_secs(60))
            .await
    );
    assert_eq!(store.get("a").await.unwrap(), Some(Bytes::from_static(b"1")));
    assert_eq!(store.get("b").await.unwrap(), None);

    let stats = memory.stats();
    assert_eq!(stats.entry_count, 1);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 1);
    assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    assert!((stats.utilization_rate - 0.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn plan_store_reflects_assignments() {
    let memory = Arc::new(MemoryPlanStore::new());
    let store: Arc<dyn PlanStore> = memory.clone();

    assert_eq!(store.plan_for_token("t1").await.unwrap(), None);
    memory.assign("t1", Plan::scaling());
    assert_eq!(
        store.plan_for_token("t1").await.unwrap(),
        Some(Plan::scaling())
    );
    memory.revoke("t1");
    assert_eq!(store.plan_for_token("t1").await.unwrap(), None);
}

#[test]
fn public_limiter_counts_per_address() {
    let limiter: Arc<dyn PublicLimiter> = Arc::new(FixedWindowLimiter::new(PublicLimitConfig {
        enabled: true,
        requests_per_minute: 1,
    }));
    let first = "198.51.100.1".parse().unwrap();
    let second = "198.51.100.2".parse().unwrap();

    assert!(limiter.check(first).allowed);
    assert!(!limiter.check(first).allowed);
    assert!(limiter.check(second).allowed);
}
