// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Chain registry
//!
//! Resolves chain slugs to node pools, loading each chain lazily from the
//! [`ConfigStore`] and refetching it once it is older than the sync
//! interval. Each slug has its own async mutex; the lock is released while
//! the store is queried, so concurrent refreshes of one slug may both fetch
//! and the last writer wins. A failed refresh of a loaded chain counts as a
//! sync: the stale value is served until the next interval.

use std::{sync::Arc, time::Duration};

use backends::ConfigStore;
use dashmap::DashMap;
use shared_types::{ChainConfig, ChainSlug};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct ChainSlot {
    config: Option<Arc<ChainConfig>>,
    last_sync: Option<Instant>,
}

impl ChainSlot {
    fn is_fresh(&self, now: Instant, sync_interval: Duration) -> bool {
        self.config.is_some()
            && self
                .last_sync
                .is_some_and(|synced| now.saturating_duration_since(synced) <= sync_interval)
    }

    /// Keep serving a loaded value until the next interval
    fn hold_stale(&mut self, now: Instant) {
        if self.config.is_some() {
            self.last_sync = Some(now);
        }
    }
}

/// Lazily loaded, periodically refreshed chain configurations
#[derive(Debug)]
pub struct ChainRegistry {
    store: Arc<dyn ConfigStore>,
    slots: DashMap<ChainSlug, Arc<Mutex<ChainSlot>>>,
    sync_interval: Duration,
}

impl ChainRegistry {
    /// Create a registry reading from `store`
    pub fn new(store: Arc<dyn ConfigStore>, sync_interval: Duration) -> Self {
        Self {
            store,
            slots: DashMap::new(),
            sync_interval,
        }
    }

    fn slot(&self, slug: &ChainSlug) -> Arc<Mutex<ChainSlot>> {
        self.slots.entry(slug.clone()).or_default().clone()
    }

    /// Resolve a chain, refreshing it when stale
    ///
    /// Store failures never surface: the previously loaded value is kept,
    /// or the chain stays unknown.
    pub async fn resolve(&self, slug: &ChainSlug) -> Option<Arc<ChainConfig>> {
        let slot = self.slot(slug);

        {
            let guard = slot.lock().await;
            if guard.is_fresh(Instant::now(), self.sync_interval) {
                return guard.config.clone();
            }
        }

        let fetched = self.store.get_chain_config(slug).await;

        let mut guard = slot.lock().await;
        let now = Instant::now();
        match fetched {
            Ok(Some(config)) if &config.slug == slug => {
                debug!(
                    chain = %slug,
                    chain_id = config.chain_id,
                    nodes = config.node_count(),
                    "chain configuration synced"
                );
                if guard.config.is_none() {
                    info!(chain = %slug, chain_id = config.chain_id, "chain loaded");
                }
                guard.config = Some(Arc::new(config));
                guard.last_sync = Some(now);
            }
            Ok(Some(config)) => {
                warn!(
                    chain = %slug,
                    returned = %config.slug,
                    "config store returned a different chain, ignoring"
                );
                guard.hold_stale(now);
            }
            Ok(None) if guard.config.is_some() => {
                warn!(chain = %slug, "chain missing from config store, keeping last known value");
                guard.hold_stale(now);
            }
            Ok(None) => {
                drop(guard);
                self.forget_if_unloaded(slug).await;
                return None;
            }
            Err(e) => {
                warn!(chain = %slug, error = %e, "chain refresh failed, keeping last known value");
                guard.hold_stale(now);
            }
        }

        guard.config.clone()
    }

    async fn forget_if_unloaded(&self, slug: &ChainSlug) {
        let Some(slot) = self.slots.get(slug).map(|slot| slot.clone()) else {
            return;
        };
        if slot.lock().await.config.is_none() {
            self.slots.remove(slug);
        }
    }

    /// Force the next resolve of `slug` to refetch
    pub async fn invalidate(&self, slug: &ChainSlug) {
        let Some(slot) = self.slots.get(slug).map(|slot| slot.clone()) else {
            return;
        };
        slot.lock().await.last_sync = None;
        debug!(chain = %slug, "chain invalidated");
    }

    /// Whether `slug` has a loaded configuration, without consulting the store
    pub async fn is_loaded(&self, slug: &ChainSlug) -> bool {
        let Some(slot) = self.slots.get(slug).map(|slot| slot.clone()) else {
            return false;
        };
        slot.lock().await.config.is_some()
    }

    /// Slugs with a loaded configuration, sorted
    pub async fn loaded_slugs(&self) -> Vec<ChainSlug> {
        let slots: Vec<_> = self
            .slots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut loaded = Vec::with_capacity(slots.len());
        for (slug, slot) in slots {
            if slot.lock().await.config.is_some() {
                loaded.push(slug);
            }
        }
        loaded.sort();
        loaded
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use backends::{MemoryConfigStore, StoreError, StoreResult};
    use mockall::{Sequence, mock};
    use tokio::time::advance;
    use url::Url;

    use super::*;

    mock! {
        Store {}

        #[async_trait]
        impl ConfigStore for Store {
            async fn get_chain_config(&self, slug: &ChainSlug) -> StoreResult<Option<ChainConfig>>;
        }
    }

    impl std::fmt::Debug for MockStore {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockStore").finish_non_exhaustive()
        }
    }

    const INTERVAL: Duration = Duration::from_secs(60);

    fn slug(value: &str) -> ChainSlug {
        ChainSlug::new(value).unwrap()
    }

    fn chain(value: &str, nodes: &[&str]) -> ChainConfig {
        let nodes: Vec<Url> = nodes.iter().map(|node| node.parse().unwrap()).collect();
        ChainConfig::new(slug(value), 1, nodes)
    }

    #[tokio::test(start_paused = true)]
    async fn loads_lazily_and_caches_within_interval() {
        let mut store = MockStore::new();
        store
            .expect_get_chain_config()
            .times(1)
            .returning(|_| Ok(Some(chain("eth", &["https://a.example/"]))));
        let registry = ChainRegistry::new(Arc::new(store), INTERVAL);

        assert!(registry.loaded_slugs().await.is_empty());
        assert!(!registry.is_loaded(&slug("eth")).await);
        let first = registry.resolve(&slug("eth")).await.unwrap();
        advance(Duration::from_secs(59)).await;
        let second = registry.resolve(&slug("eth")).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.is_loaded(&slug("eth")).await);
        assert_eq!(registry.loaded_slugs().await, vec![slug("eth")]);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_replaces_the_whole_config() {
        let store = Arc::new(MemoryConfigStore::with_chains([chain(
            "eth",
            &["https://a.example/"],
        )
        .with_mev_nodes(vec!["https://relay.example/".parse().unwrap()])]));
        let registry = ChainRegistry::new(store.clone(), INTERVAL);

        let before = registry.resolve(&slug("eth")).await.unwrap();
        assert_eq!(before.mev_nodes.len(), 1);

        store.upsert(chain("eth", &["https://b.example/", "https://c.example/"]));
        advance(Duration::from_secs(61)).await;

        let after = registry.resolve(&slug("eth")).await.unwrap();
        assert_eq!(after.standard_nodes.len(), 2);
        assert!(after.mev_nodes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_stale_value_until_next_interval() {
        let mut store = MockStore::new();
        let mut seq = Sequence::new();
        store
            .expect_get_chain_config()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(chain("eth", &["https://a.example/"]))));
        store
            .expect_get_chain_config()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(StoreError::unavailable("connection reset")));
        store
            .expect_get_chain_config()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        let registry = ChainRegistry::new(Arc::new(store), INTERVAL);

        let loaded = registry.resolve(&slug("eth")).await.unwrap();

        // each interval of the outage costs a single fetch
        advance(Duration::from_secs(61)).await;
        for _ in 0..100 {
            let resolved = registry.resolve(&slug("eth")).await.unwrap();
            assert!(Arc::ptr_eq(&loaded, &resolved));
        }

        advance(Duration::from_secs(61)).await;
        for _ in 0..100 {
            let resolved = registry.resolve(&slug("eth")).await.unwrap();
            assert!(Arc::ptr_eq(&loaded, &resolved));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_chain_is_not_retained() {
        let mut store = MockStore::new();
        store.expect_get_chain_config().times(2).returning(|_| Ok(None));
        let registry = ChainRegistry::new(Arc::new(store), INTERVAL);

        assert!(registry.resolve(&slug("nope")).await.is_none());
        assert!(registry.resolve(&slug("nope")).await.is_none());
        assert!(registry.loaded_slugs().await.is_empty());
        assert!(!registry.is_loaded(&slug("nope")).await);
        assert!(registry.slots.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failing_store_leaves_chain_unknown() {
        let mut store = MockStore::new();
        store
            .expect_get_chain_config()
            .returning(|_| Err(StoreError::unavailable("down")));
        let registry = ChainRegistry::new(Arc::new(store), INTERVAL);

        assert!(registry.resolve(&slug("eth")).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_slug_is_ignored() {
        let mut store = MockStore::new();
        store
            .expect_get_chain_config()
            .returning(|_| Ok(Some(chain("base", &["https://a.example/"]))));
        let registry = ChainRegistry::new(Arc::new(store), INTERVAL);

        assert!(registry.resolve(&slug("eth")).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_refetch() {
        let mut store = MockStore::new();
        store
            .expect_get_chain_config()
            .times(2)
            .returning(|_| Ok(Some(chain("eth", &["https://a.example/"]))));
        let registry = ChainRegistry::new(Arc::new(store), INTERVAL);

        registry.resolve(&slug("eth")).await.unwrap();
        registry.invalidate(&slug("eth")).await;
        registry.resolve(&slug("eth")).await.unwrap();
        registry.resolve(&slug("eth")).await.unwrap();
    }
}
