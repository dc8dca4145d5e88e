// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Durable chain configuration stores
//!
//! The store is the source of truth for chain to node-pool mappings. The
//! gateway polls it lazily and keeps its own copy, so a store only has to
//! answer point lookups.

use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shared_types::{ChainConfig, ChainSlug};
use tokio::fs;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Source of chain configuration
#[async_trait]
pub trait ConfigStore: Send + Sync + fmt::Debug {
    /// Fetch the configuration of one chain, `None` if it is not configured
    async fn get_chain_config(&self, slug: &ChainSlug) -> StoreResult<Option<ChainConfig>>;
}

/// In-memory configuration store
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    chains: DashMap<ChainSlug, ChainConfig>,
}

impl MemoryConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given chains
    pub fn with_chains(chains: impl IntoIterator<Item = ChainConfig>) -> Self {
        let store = Self::new();
        for chain in chains {
            store.upsert(chain);
        }
        store
    }

    /// Insert or replace a chain, returning the previous value
    pub fn upsert(&self, chain: ChainConfig) -> Option<ChainConfig> {
        self.chains.insert(chain.slug.clone(), chain)
    }

    /// Remove a chain
    pub fn remove(&self, slug: &ChainSlug) -> Option<ChainConfig> {
        self.chains.remove(slug).map(|(_, chain)| chain)
    }

    /// Number of configured chains
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Whether no chain is configured
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get_chain_config(&self, slug: &ChainSlug) -> StoreResult<Option<ChainConfig>> {
        Ok(self.chains.get(slug).map(|chain| chain.clone()))
    }
}

/// On-disk layout of a chains file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainsFile {
    /// Configured chains
    pub chains: Vec<ChainConfig>,
}

impl ChainsFile {
    /// Load and validate a chains file (YAML, or JSON which YAML parses too)
    pub async fn from_file<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        debug!("loading chains from: {}", path.display());

        let content = fs::read_to_string(path).await.map_err(|e| StoreError::Io {
            message: format!("failed to read {}: {e}", path.display()),
        })?;

        let file: Self = serde_yaml::from_str(&content).map_err(|e| StoreError::Parse {
            source_name: path.display().to_string(),
            message: e.to_string(),
        })?;

        file.validate()?;
        Ok(file)
    }

    /// Ensure slugs are unique
    pub fn validate(&self) -> StoreResult<()> {
        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(&chain.slug) {
                return Err(StoreError::Invalid {
                    message: format!("chain {} is defined more than once", chain.slug),
                });
            }
        }
        Ok(())
    }
}

/// Configuration store backed by a YAML or JSON file
///
/// The file is re-read on every lookup, so edits become visible on the
/// gateway's next refresh without a restart.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Create a store reading from `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn get_chain_config(&self, slug: &ChainSlug) -> StoreResult<Option<ChainConfig>> {
        let file = ChainsFile::from_file(&self.path).await?;
        Ok(file.chains.into_iter().find(|chain| &chain.slug == slug))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use url::Url;

    use super::*;

    fn slug(value: &str) -> ChainSlug {
        ChainSlug::new(value).unwrap()
    }

    fn chain(value: &str, chain_id: u64) -> ChainConfig {
        let node: Url = format!("https://{value}.node.example/").parse().unwrap();
        ChainConfig::new(slug(value), chain_id, vec![node])
    }

    #[tokio::test]
    async fn memory_store_lookup() {
        let store = MemoryConfigStore::with_chains([chain("eth", 1), chain("base", 8453)]);
        assert_eq!(store.len(), 2);

        let eth = store.get_chain_config(&slug("eth")).await.unwrap().unwrap();
        assert_eq!(eth.chain_id, 1);
        assert!(store.get_chain_config(&slug("op")).await.unwrap().is_none());

        store.remove(&slug("eth"));
        assert!(store.get_chain_config(&slug("eth")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_upsert_replaces_whole_value() {
        let store = MemoryConfigStore::new();
        store.upsert(chain("eth", 1).with_mev_nodes(vec!["https://relay.example/".parse().unwrap()]));
        let previous = store.upsert(chain("eth", 1));

        assert_eq!(previous.unwrap().mev_nodes.len(), 1);
        let current = store.get_chain_config(&slug("eth")).await.unwrap().unwrap();
        assert!(current.mev_nodes.is_empty());
    }

    #[tokio::test]
    async fn file_store_reads_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "chains:\n  - slug: eth\n    chain_id: 1\n    standard_nodes: [\"https://a.example/\"]\n    archive_nodes: [\"https://archive.example/\"]"
        )
        .unwrap();

        let store = FileConfigStore::new(file.path());
        let eth = store.get_chain_config(&slug("eth")).await.unwrap().unwrap();
        assert_eq!(eth.standard_nodes.len(), 1);
        assert_eq!(eth.archive_nodes.len(), 1);
        assert!(store.get_chain_config(&slug("base")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_reads_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"chains":[{{"slug":"base","chain_id":8453,"standard_nodes":["https://b.example/"]}}]}}"#
        )
        .unwrap();

        let store = FileConfigStore::new(file.path());
        let base = store.get_chain_config(&slug("base")).await.unwrap().unwrap();
        assert_eq!(base.chain_id, 8453);
    }

    #[tokio::test]
    async fn file_store_errors() {
        let store = FileConfigStore::new("/nonexistent/chains.yaml");
        assert!(matches!(
            store.get_chain_config(&slug("eth")).await,
            Err(StoreError::Io { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "chains: [{{slug: \"Not Valid\", chain_id: 1}}]").unwrap();
        let store = FileConfigStore::new(file.path());
        assert!(matches!(
            store.get_chain_config(&slug("eth")).await,
            Err(StoreError::Parse { .. })
        ));
    }

    #[test]
    fn duplicate_slugs_are_rejected() {
        let file = ChainsFile {
            chains: vec![chain("eth", 1), chain("eth", 1)],
        };
        assert!(matches!(file.validate(), Err(StoreError::Invalid { .. })));
    }
}
