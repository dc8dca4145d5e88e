// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Per-request telemetry
//!
//! The gateway emits one [`RequestMetrics`] record for every inbound call,
//! whatever its outcome. Sinks receive records from the background queue,
//! so a slow sink never delays a response.
//!
//! Slugs and method names come from callers, so aggregating sinks only keep
//! chains the gateway resolved and fold methods past
//! [`MAX_TRACKED_METHODS`] into [`OTHER_METHOD`].

use std::{collections::BTreeMap, fmt, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shared_types::{CacheStatus, ChainSlug, RoutingCategory};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::StoreResult;

/// Distinct methods aggregated per chain before folding into [`OTHER_METHOD`]
pub const MAX_TRACKED_METHODS: usize = 64;

/// Bucket for methods past [`MAX_TRACKED_METHODS`]
pub const OTHER_METHOD: &str = "other";

/// Chain label for calls to chains that never resolved
pub const UNKNOWN_CHAIN: &str = "unknown";

/// Final outcome of one inbound call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    /// Upstream node answered
    Success,
    /// Served from cache
    CacheHit,
    /// Rejected by the rate limiter
    RateLimited,
    /// Chain slug is not configured
    ChainNotFound,
    /// Chain has no node for the call's category
    NoNodesConfigured,
    /// Every candidate node failed
    AllNodesFailed,
    /// Caller went away before an answer
    Cancelled,
}

impl RequestOutcome {
    /// Label used in logs, metrics and summaries
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::CacheHit => "cache_hit",
            Self::RateLimited => "rate_limited",
            Self::ChainNotFound => "chain_not_found",
            Self::NoNodesConfigured => "no_nodes_configured",
            Self::AllNodesFailed => "all_nodes_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Telemetry record of one inbound call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMetrics {
    /// Unique record id
    pub id: Uuid,
    /// Chain the call was addressed to
    pub chain: ChainSlug,
    /// Method of the (first) call
    pub method: String,
    /// Routing category, absent when the call never reached routing
    pub category: Option<RoutingCategory>,
    /// Cache outcome
    pub cache_status: CacheStatus,
    /// Final outcome
    pub outcome: RequestOutcome,
    /// Status of the answering or last failing node
    pub upstream_status: Option<u16>,
    /// Time from receipt to answer
    #[serde(with = "duration_millis")]
    pub latency: Duration,
    /// Whether the call carried an access token
    pub authenticated: bool,
    /// Whether the chain had a loaded configuration when the call finished
    #[serde(default)]
    pub known_chain: bool,
    /// When the call was received
    pub timestamp: DateTime<Utc>,
}

impl RequestMetrics {
    /// Start a record for a call received now
    pub fn new(chain: ChainSlug, method: impl Into<String>, outcome: RequestOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            chain,
            method: method.into(),
            category: None,
            cache_status: CacheStatus::Bypass,
            outcome,
            upstream_status: None,
            latency: Duration::ZERO,
            authenticated: false,
            known_chain: false,
            timestamp: Utc::now(),
        }
    }

    /// Chain label safe for bounded aggregation
    pub fn chain_label(&self) -> &str {
        if self.known_chain {
            self.chain.as_str()
        } else {
            UNKNOWN_CHAIN
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Aggregated view of one chain's traffic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChainSummary {
    /// Chain slug
    #[schema(example = "eth")]
    pub chain: String,
    /// Number of recorded calls
    pub total_requests: u64,
    /// Calls per method
    pub by_method: BTreeMap<String, u64>,
    /// Calls per cache status
    pub by_cache_status: BTreeMap<String, u64>,
    /// Calls per outcome
    pub by_outcome: BTreeMap<String, u64>,
    /// Mean latency in milliseconds
    pub average_latency_ms: f64,
}

/// Destination of telemetry records
#[async_trait]
pub trait TelemetrySink: Send + Sync + fmt::Debug {
    /// Record one call
    async fn record(&self, metrics: RequestMetrics) -> StoreResult<()>;

    /// Aggregated traffic of a chain, `None` if the sink keeps no aggregates
    async fn summary(&self, _chain: &ChainSlug) -> StoreResult<Option<ChainSummary>> {
        Ok(None)
    }
}

/// Sink writing one structured log line per call
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetrySink;

#[async_trait]
impl TelemetrySink for TracingTelemetrySink {
    async fn record(&self, metrics: RequestMetrics) -> StoreResult<()> {
        info!(
            target: "nullrpc::telemetry",
            id = %metrics.id,
            chain = %metrics.chain,
            method = %metrics.method,
            category = metrics.category.map(RoutingCategory::as_str),
            cache = %metrics.cache_status,
            outcome = %metrics.outcome,
            upstream_status = metrics.upstream_status,
            latency_ms = u64::try_from(metrics.latency.as_millis()).unwrap_or(u64::MAX),
            authenticated = metrics.authenticated,
            known_chain = metrics.known_chain,
            "request completed"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ChainAggregate {
    total_requests: u64,
    total_latency: Duration,
    by_method: BTreeMap<String, u64>,
    by_cache_status: BTreeMap<String, u64>,
    by_outcome: BTreeMap<String, u64>,
}

/// Sink aggregating per-chain counters in memory
#[derive(Debug, Default)]
pub struct MemoryTelemetrySink {
    chains: DashMap<ChainSlug, ChainAggregate>,
}

impl MemoryTelemetrySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TelemetrySink for MemoryTelemetrySink {
    async fn record(&self, metrics: RequestMetrics) -> StoreResult<()> {
        if !metrics.known_chain {
            return Ok(());
        }

        let mut aggregate = self.chains.entry(metrics.chain).or_default();
        aggregate.total_requests += 1;
        aggregate.total_latency += metrics.latency;
        let method = if aggregate.by_method.contains_key(&metrics.method)
            || aggregate.by_method.len() < MAX_TRACKED_METHODS
        {
            metrics.method
        } else {
            OTHER_METHOD.to_string()
        };
        *aggregate.by_method.entry(method).or_insert(0) += 1;
        *aggregate
            .by_cache_status
            .entry(metrics.cache_status.as_str().to_string())
            .or_insert(0) += 1;
        *aggregate
            .by_outcome
            .entry(metrics.outcome.as_str().to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    async fn summary(&self, chain: &ChainSlug) -> StoreResult<Option<ChainSummary>> {
        let Some(aggregate) = self.chains.get(chain) else {
            return Ok(None);
        };

        #[allow(clippy::cast_precision_loss)]
        let average_latency_ms = if aggregate.total_requests > 0 {
            aggregate.total_latency.as_secs_f64() * 1000.0 / aggregate.total_requests as f64
        } else {
            0.0
        };

        Ok(Some(ChainSummary {
            chain: chain.to_string(),
            total_requests: aggregate.total_requests,
            by_method: aggregate.by_method.clone(),
            by_cache_status: aggregate.by_cache_status.clone(),
            by_outcome: aggregate.by_outcome.clone(),
            average_latency_ms,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        chain: &str,
        method: &str,
        outcome: RequestOutcome,
        latency_ms: u64,
    ) -> RequestMetrics {
        let mut metrics = RequestMetrics::new(ChainSlug::new(chain).unwrap(), method, outcome);
        metrics.known_chain = true;
        metrics.latency = Duration::from_millis(latency_ms);
        metrics.cache_status = if outcome == RequestOutcome::CacheHit {
            CacheStatus::Hit
        } else {
            CacheStatus::Miss
        };
        metrics
    }

    #[tokio::test]
    async fn memory_sink_aggregates_per_chain() {
        let sink = MemoryTelemetrySink::new();
        sink.record(record("eth", "eth_chainId", RequestOutcome::Success, 30))
            .await
            .unwrap();
        sink.record(record("eth", "eth_chainId", RequestOutcome::CacheHit, 10))
            .await
            .unwrap();
        sink.record(record("eth", "eth_call", RequestOutcome::AllNodesFailed, 50))
            .await
            .unwrap();
        sink.record(record("base", "eth_call", RequestOutcome::Success, 5))
            .await
            .unwrap();

        let eth = ChainSlug::new("eth").unwrap();
        let summary = sink.summary(&eth).await.unwrap().unwrap();
        assert_eq!(summary.chain, "eth");
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.by_method["eth_chainId"], 2);
        assert_eq!(summary.by_cache_status["HIT"], 1);
        assert_eq!(summary.by_cache_status["MISS"], 2);
        assert_eq!(summary.by_outcome["all_nodes_failed"], 1);
        assert!((summary.average_latency_ms - 30.0).abs() < 1e-9);

        let op = ChainSlug::new("op").unwrap();
        assert!(sink.summary(&op).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_sink_stays_bounded_under_junk_traffic() {
        let sink = MemoryTelemetrySink::new();
        for i in 0..1000 {
            let method = format!("junk_{i}");
            sink.record(record("eth", &method, RequestOutcome::RateLimited, 1))
                .await
                .unwrap();

            let mut stray = record(&format!("x{i}"), "eth_call", RequestOutcome::ChainNotFound, 1);
            stray.known_chain = false;
            sink.record(stray).await.unwrap();
        }

        let eth = ChainSlug::new("eth").unwrap();
        let summary = sink.summary(&eth).await.unwrap().unwrap();
        assert_eq!(summary.total_requests, 1000);
        assert_eq!(summary.by_method.len(), MAX_TRACKED_METHODS + 1);
        assert_eq!(
            summary.by_method[OTHER_METHOD],
            1000 - u64::try_from(MAX_TRACKED_METHODS).unwrap()
        );
        assert!(summary.by_method.contains_key("junk_0"));
        assert_eq!(sink.chains.len(), 1);
        assert!(
            sink.summary(&ChainSlug::new("x999").unwrap())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn unknown_chains_share_one_label() {
        let mut metrics = record("x42", "eth_call", RequestOutcome::ChainNotFound, 1);
        assert_eq!(metrics.chain_label(), "x42");
        metrics.known_chain = false;
        assert_eq!(metrics.chain_label(), UNKNOWN_CHAIN);
    }

    #[tokio::test]
    async fn tracing_sink_keeps_no_summary() {
        let sink = TracingTelemetrySink;
        let eth = ChainSlug::new("eth").unwrap();
        sink.record(record("eth", "eth_chainId", RequestOutcome::Success, 1))
            .await
            .unwrap();
        assert!(sink.summary(&eth).await.unwrap().is_none());
    }

    #[test]
    fn metrics_serialize_latency_as_millis() {
        let metrics = record("eth", "eth_chainId", RequestOutcome::RateLimited, 1234);
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["latency"], 1234);
        assert_eq!(json["outcome"], "rate_limited");
        assert_eq!(json["chain"], "eth");
    }
}
