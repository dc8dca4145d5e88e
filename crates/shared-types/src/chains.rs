// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Chain identifiers and node pool configuration
//!
//! A chain is addressed by a short slug (for example `eth`) taken from the
//! request path. Each chain owns three ordered pools of upstream node URLs.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;
use utoipa::ToSchema;

use crate::rpc::RoutingCategory;

const MAX_SLUG_LENGTH: usize = 32;

/// Validated chain slug such as `eth` or `base-sepolia`
///
/// Slugs are 1 to 32 characters of lowercase ASCII letters, digits, `-` or `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, ToSchema)]
#[schema(value_type = String, example = "eth")]
pub struct ChainSlug(Box<str>);

impl ChainSlug {
    /// Create a new slug, validating its format
    ///
    /// # Errors
    ///
    /// Returns `ChainSlugParseError` if the value is empty, too long, or
    /// contains characters outside `[a-z0-9_-]`.
    pub fn new(value: &str) -> Result<Self, ChainSlugParseError> {
        if value.is_empty() {
            return Err(ChainSlugParseError::Empty);
        }
        if value.len() > MAX_SLUG_LENGTH {
            return Err(ChainSlugParseError::TooLong(value.len()));
        }
        if let Some(invalid) = value
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_'))
        {
            return Err(ChainSlugParseError::InvalidCharacter(invalid));
        }
        Ok(Self(Box::from(value)))
    }

    /// The slug as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChainSlug {
    type Err = ChainSlugParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ChainSlug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ChainSlug {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ChainSlug {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::new(&value).map_err(serde::de::Error::custom)
    }
}

/// Error type for chain slug parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainSlugParseError {
    /// Slug was empty
    #[error("chain slug cannot be empty")]
    Empty,
    /// Slug exceeded the maximum length
    #[error("chain slug is {0} characters long, maximum is 32")]
    TooLong(usize),
    /// Slug contained a character outside the allowed set
    #[error("chain slug contains invalid character {0:?}, allowed are [a-z0-9_-]")]
    InvalidCharacter(char),
}

/// Node pools for one chain
///
/// The three pools are always replaced together; a refresh never merges
/// into an existing value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChainConfig {
    /// Unique chain slug
    pub slug: ChainSlug,
    /// Numeric EIP-155 chain id
    #[schema(example = 1)]
    pub chain_id: u64,
    /// Full nodes serving recent state
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub standard_nodes: Vec<Url>,
    /// Nodes able to answer historical state queries
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub archive_nodes: Vec<Url>,
    /// Private relays for raw transaction submission
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub mev_nodes: Vec<Url>,
    /// Block height below which block-parameterized reads go to archive nodes,
    /// overriding the gateway-wide value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_block_threshold: Option<u64>,
}

impl ChainConfig {
    /// Create a chain config with only standard nodes
    pub fn new(slug: ChainSlug, chain_id: u64, standard_nodes: Vec<Url>) -> Self {
        Self {
            slug,
            chain_id,
            standard_nodes,
            archive_nodes: Vec::new(),
            mev_nodes: Vec::new(),
            recent_block_threshold: None,
        }
    }

    /// Set the archive pool
    #[must_use]
    pub fn with_archive_nodes(mut self, nodes: Vec<Url>) -> Self {
        self.archive_nodes = nodes;
        self
    }

    /// Set the MEV-protected pool
    #[must_use]
    pub fn with_mev_nodes(mut self, nodes: Vec<Url>) -> Self {
        self.mev_nodes = nodes;
        self
    }

    /// Set a chain-specific recent block threshold
    #[must_use]
    pub fn with_recent_block_threshold(mut self, threshold: u64) -> Self {
        self.recent_block_threshold = Some(threshold);
        self
    }

    /// The primary pool for a routing category
    pub fn pool(&self, category: RoutingCategory) -> &[Url] {
        match category {
            RoutingCategory::Standard => &self.standard_nodes,
            RoutingCategory::Archive => &self.archive_nodes,
            RoutingCategory::Mev => &self.mev_nodes,
        }
    }

    /// Total number of configured nodes across all pools
    pub fn node_count(&self) -> usize {
        self.standard_nodes.len() + self.archive_nodes.len() + self.mev_nodes.len()
    }
}
