// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Per-call orchestration
//!
//! The [`Gateway`] coordinates rate limiting, the response cache, request
//! classification, chain resolution and node dispatch. Cache writes and
//! telemetry are handed to the background queue once the answer is known.

use std::{sync::Arc, time::Duration};

use backends::{
    CacheStore, ChainSummary, ConfigStore, PlanStore, PublicLimiter, RequestMetrics,
    RequestOutcome, TelemetrySink,
};
use bytes::Bytes;
use node_client::NodeClient;
use shared_types::{CacheStatus, ChainConfig, ChainSlug, RequestEnvelope, RoutingCategory};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    cache_policy::{CacheDecision, CacheFingerprint, CachePolicy},
    classifier::classify_envelope,
    config::ProxyConfig,
    dispatcher::NodeDispatcher,
    error::{DispatchError, GatewayError, GatewayResult},
    rate_limiter::{RateLimitIdentity, RateLimiter},
    registry::ChainRegistry,
    response_cache::{ResponseCache, with_request_id},
    tasks::BackgroundTasks,
};

/// Content type of responses served from cache
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Collaborators the gateway is built from
#[derive(Debug, Clone)]
pub struct GatewayParts {
    /// Source of chain definitions
    pub config_store: Arc<dyn ConfigStore>,
    /// Response storage, `None` disables caching
    pub cache_store: Option<Arc<dyn CacheStore>>,
    /// Token to plan lookup
    pub plan_store: Arc<dyn PlanStore>,
    /// Limiter for anonymous callers
    pub public_limiter: Arc<dyn PublicLimiter>,
    /// Transport to upstream nodes
    pub node_client: Arc<dyn NodeClient>,
    /// Destination of per-call records
    pub telemetry: Arc<dyn TelemetrySink>,
}

/// One inbound call
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    /// Chain addressed by the path
    pub chain: ChainSlug,
    /// Who the call is counted against
    pub identity: RateLimitIdentity,
    /// Raw request body, forwarded verbatim
    pub body: Bytes,
}

/// Answer to a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    /// Body to return to the caller
    pub body: Bytes,
    /// HTTP status of the answering node, 200 for cache hits
    pub status: u16,
    /// Content type of the body
    pub content_type: Option<String>,
    /// Cache outcome
    pub cache_status: CacheStatus,
    /// Routing category, `None` for cache hits
    pub category: Option<RoutingCategory>,
}

/// Multi-chain JSON-RPC gateway
#[derive(Debug)]
pub struct Gateway {
    registry: ChainRegistry,
    rate_limiter: RateLimiter,
    policy: CachePolicy,
    cache: Option<ResponseCache>,
    dispatcher: NodeDispatcher,
    telemetry: Arc<dyn TelemetrySink>,
    tasks: BackgroundTasks,
    recent_block_threshold: u64,
}

impl Gateway {
    /// Build a gateway and start its background queue
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &ProxyConfig, parts: GatewayParts) -> Self {
        info!(
            caching = parts.cache_store.is_some(),
            sync_interval_secs = config.sync_interval.as_secs(),
            recent_block_threshold = config.recent_block_threshold,
            normalize_request_id = config.normalize_request_id,
            "initializing gateway"
        );

        Self {
            registry: ChainRegistry::new(parts.config_store, config.sync_interval),
            rate_limiter: RateLimiter::new(
                parts.plan_store,
                parts.public_limiter,
                config.burst_multiplier,
            ),
            policy: CachePolicy::new(config),
            cache: parts.cache_store.map(ResponseCache::new),
            dispatcher: NodeDispatcher::new(parts.node_client, config.budgets),
            telemetry: parts.telemetry,
            tasks: BackgroundTasks::spawn(config.background),
            recent_block_threshold: config.recent_block_threshold,
        }
    }

    /// Whether responses are cached at all
    pub fn caching_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Serve one call
    ///
    /// Exactly one telemetry record is queued per call, whatever the
    /// outcome.
    #[instrument(skip_all, fields(chain = %request.chain))]
    pub async fn handle(
        &self,
        request: GatewayRequest,
        cancel: &CancellationToken,
    ) -> GatewayResult<GatewayResponse> {
        let started = Instant::now();
        let envelope = RequestEnvelope::parse(&request.body);

        let mut metrics = RequestMetrics::new(
            request.chain.clone(),
            envelope.method.clone(),
            RequestOutcome::Success,
        );
        metrics.authenticated = matches!(request.identity, RateLimitIdentity::Token(_));
        metrics.cache_status = if self.cache.is_some() {
            CacheStatus::Bypass
        } else {
            CacheStatus::None
        };

        let result = self.process(&request, &envelope, cancel, &mut metrics).await;

        metrics.outcome = outcome_of(&result);
        metrics.latency = started.elapsed();
        metrics.known_chain = self.registry.is_loaded(&request.chain).await;
        if let Err(e) = &result {
            debug!(error = %e, outcome = %metrics.outcome, "call failed");
        }
        self.emit(metrics);

        result
    }

    async fn process(
        &self,
        request: &GatewayRequest,
        envelope: &RequestEnvelope,
        cancel: &CancellationToken,
        metrics: &mut RequestMetrics,
    ) -> GatewayResult<GatewayResponse> {
        let decision = self.rate_limiter.check(&request.identity).await;
        if let Some(reason) = decision.reason {
            return Err(GatewayError::RateLimited { reason });
        }

        let cache_decision = self.policy.decide_envelope(envelope);
        let fingerprint = (self.cache.is_some() && cache_decision.cacheable)
            .then(|| self.policy.fingerprint(&request.chain, &request.body));

        if let (Some(cache), Some(fingerprint)) = (&self.cache, &fingerprint) {
            if let Some(body) = cache.get(fingerprint).await {
                debug!(method = %envelope.method, "cache hit");
                metrics.cache_status = CacheStatus::Hit;
                let body = if self.policy.normalizes_request_id() {
                    with_request_id(&body, &envelope.id)
                } else {
                    body
                };
                return Ok(GatewayResponse {
                    body,
                    status: 200,
                    content_type: Some(JSON_CONTENT_TYPE.to_string()),
                    cache_status: CacheStatus::Hit,
                    category: None,
                });
            }
            metrics.cache_status = CacheStatus::Miss;
        }

        let chain = self.resolve(&request.chain).await?;
        let threshold = chain
            .recent_block_threshold
            .unwrap_or(self.recent_block_threshold);
        let category = classify_envelope(envelope, threshold);
        metrics.category = Some(category);

        let outcome = self
            .dispatcher
            .dispatch(category, &chain, request.body.clone(), cancel)
            .await
            .inspect_err(|e| metrics.upstream_status = e.upstream_status())?;

        metrics.upstream_status = Some(outcome.response.status);
        debug!(
            method = %envelope.method,
            category = %category,
            node = %outcome.node,
            pool = %outcome.pool,
            attempts = outcome.attempts,
            "call dispatched"
        );

        if let Some(fingerprint) = fingerprint {
            self.store(fingerprint, outcome.response.body.clone(), cache_decision);
        }

        Ok(GatewayResponse {
            body: outcome.response.body,
            status: outcome.response.status,
            content_type: outcome.response.content_type,
            cache_status: metrics.cache_status,
            category: Some(category),
        })
    }

    async fn resolve(&self, chain: &ChainSlug) -> GatewayResult<Arc<ChainConfig>> {
        self.registry
            .resolve(chain)
            .await
            .ok_or_else(|| GatewayError::ChainNotFound {
                chain: chain.clone(),
            })
    }

    fn store(&self, fingerprint: CacheFingerprint, body: Bytes, decision: CacheDecision) {
        let Some(cache) = self.cache.clone() else {
            return;
        };
        self.tasks.submit("cache_write", async move {
            cache.put(&fingerprint, body, decision.ttl).await;
        });
    }

    fn emit(&self, metrics: RequestMetrics) {
        let telemetry = self.telemetry.clone();
        self.tasks.submit("telemetry", async move {
            if let Err(e) = telemetry.record(metrics).await {
                warn!(error = %e, "telemetry record failed");
            }
        });
    }

    /// Traffic summary of a configured chain
    ///
    /// A chain without recorded traffic, or a sink without aggregates,
    /// yields an empty summary.
    pub async fn summary(&self, chain: &ChainSlug) -> GatewayResult<ChainSummary> {
        self.resolve(chain).await?;

        let summary = match self.telemetry.summary(chain).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(chain = %chain, error = %e, "telemetry summary failed");
                None
            }
        };

        Ok(summary.unwrap_or_else(|| ChainSummary {
            chain: chain.to_string(),
            ..ChainSummary::default()
        }))
    }

    /// Chains loaded so far, sorted
    pub async fn loaded_chains(&self) -> Vec<ChainSlug> {
        self.registry.loaded_slugs().await
    }

    /// Drop limiter state of tokens idle for longer than `max_idle`
    pub fn prune_rate_limits(&self, max_idle: Duration) -> usize {
        self.rate_limiter.prune_idle(max_idle)
    }

    /// Background tasks dropped so far
    pub fn dropped_background_tasks(&self) -> u64 {
        self.tasks.dropped()
    }

    /// Drain the background queue
    pub async fn shutdown(&self) {
        info!("shutting down gateway");
        self.tasks.shutdown().await;
    }
}

fn outcome_of(result: &GatewayResult<GatewayResponse>) -> RequestOutcome {
    match result {
        Ok(response) if response.cache_status == CacheStatus::Hit => RequestOutcome::CacheHit,
        Ok(_) => RequestOutcome::Success,
        Err(GatewayError::RateLimited { .. }) => RequestOutcome::RateLimited,
        Err(GatewayError::ChainNotFound { .. }) => RequestOutcome::ChainNotFound,
        Err(GatewayError::Dispatch(DispatchError::NoNodesConfigured { .. })) => {
            RequestOutcome::NoNodesConfigured
        }
        Err(GatewayError::Dispatch(DispatchError::AllNodesFailed { .. })) => {
            RequestOutcome::AllNodesFailed
        }
        Err(GatewayError::Dispatch(DispatchError::Cancelled)) => RequestOutcome::Cancelled,
    }
}
