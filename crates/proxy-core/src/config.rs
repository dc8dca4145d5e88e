// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Tunables of the gateway core

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use shared_types::RoutingCategory;

/// Block height below which block-parameterized reads are sent to archive
/// nodes, when a chain does not set its own value
pub const DEFAULT_RECENT_BLOCK_THRESHOLD: u64 = 18_000_000;

/// Core gateway settings
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Age after which a loaded chain configuration is refetched
    #[serde_as(as = "DurationSeconds<u64>")]
    pub sync_interval: Duration,
    /// Gateway-wide recent block threshold
    pub recent_block_threshold: u64,
    /// TTL of responses that change with every block
    #[serde_as(as = "DurationSeconds<u64>")]
    pub volatile_ttl: Duration,
    /// TTL of responses that never change
    #[serde_as(as = "DurationSeconds<u64>")]
    pub immutable_ttl: Duration,
    /// Bucket capacity as a multiple of a plan's requests per second
    pub burst_multiplier: f64,
    /// Hash request bodies with their id replaced, so callers share entries
    pub normalize_request_id: bool,
    /// Attempt budgets per node pool
    pub budgets: DispatchBudgets,
    /// Background queue sizing
    pub background: BackgroundConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(60),
            recent_block_threshold: DEFAULT_RECENT_BLOCK_THRESHOLD,
            volatile_ttl: Duration::from_secs(1),
            immutable_ttl: Duration::from_secs(900),
            burst_multiplier: 1.5,
            normalize_request_id: false,
            budgets: DispatchBudgets::default(),
            background: BackgroundConfig::default(),
        }
    }
}

/// Maximum attempts against each pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchBudgets {
    /// Standard pool
    pub standard: usize,
    /// Archive pool
    pub archive: usize,
    /// MEV-protected pool, before falling back to standard
    pub mev: usize,
    /// Standard pool when the MEV pool is exhausted
    pub mev_fallback: usize,
}

impl Default for DispatchBudgets {
    fn default() -> Self {
        Self {
            standard: 3,
            archive: 3,
            mev: 2,
            mev_fallback: 3,
        }
    }
}

impl DispatchBudgets {
    /// Budget for the primary pool of a category
    pub fn for_category(&self, category: RoutingCategory) -> usize {
        match category {
            RoutingCategory::Standard => self.standard,
            RoutingCategory::Archive => self.archive,
            RoutingCategory::Mev => self.mev,
        }
    }
}

/// Background queue sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Tasks waiting to run before new ones are dropped
    pub queue_capacity: usize,
    /// Tasks running at once
    pub max_concurrency: usize,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_concurrency: 32,
        }
    }
}
