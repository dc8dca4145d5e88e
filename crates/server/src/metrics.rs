// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics module
//!
//! Provides global metrics using the default Prometheus registry, a
//! telemetry sink decorator feeding them from per-call records, and an
//! Axum-compatible metrics handler.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use backends::{
    ChainSummary, RequestMetrics, RequestOutcome, StoreResult, TelemetrySink,
    TracingTelemetrySink,
};
use prometheus::{
    Encoder, Gauge, HistogramVec, IntCounterVec, IntGauge, TextEncoder, register_gauge,
    register_histogram_vec, register_int_counter_vec, register_int_gauge,
};
use shared_types::ChainSlug;

use crate::{error::ServerError, state::ServerState};

/// Total number of calls, labeled by chain, routing category and outcome.
pub static REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "nullrpc_requests_total",
        "Total number of JSON-RPC calls, labeled by chain, category and outcome",
        &["chain", "category", "outcome"]
    )
    .expect("Failed to create nullrpc_requests_total counter vec")
});

/// Histogram of call latency for calls that reached upstream nodes, in seconds.
pub static UPSTREAM_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "nullrpc_upstream_request_duration_seconds",
        "Upstream dispatch durations in seconds",
        &["chain", "category", "result"],
        vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to create upstream request duration histogram")
});

/// Cache outcome counters
pub static CACHE_OPERATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "nullrpc_cache_operations_total",
        "Total number of calls per cache status",
        &["status"]
    )
    .expect("Failed to create cache operations counter vec")
});

/// Rate limit rejections by reason
pub static RATE_LIMIT_REJECTIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "nullrpc_rate_limit_rejections_total",
        "Total number of rate limited calls, labeled by reason",
        &["reason"]
    )
    .expect("Failed to create rate limit rejections counter vec")
});

/// Cache utilization gauge
pub static CACHE_UTILIZATION: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge!(
        "nullrpc_cache_utilization_ratio",
        "Current cache utilization as a ratio (0.0 to 1.0)"
    )
    .expect("Failed to create cache utilization gauge")
});

/// Cache hit rate gauge
pub static CACHE_HIT_RATE: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge!(
        "nullrpc_cache_hit_rate",
        "Cache hit rate as a ratio (0.0 to 1.0)"
    )
    .expect("Failed to create cache hit rate gauge")
});

/// Cache size gauge
pub static CACHE_SIZE: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge!(
        "nullrpc_cache_entries_count",
        "Current number of entries in cache"
    )
    .expect("Failed to create cache size gauge")
});

/// Background tasks dropped because the queue was full
pub static BACKGROUND_TASKS_DROPPED: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(
        "nullrpc_background_tasks_dropped",
        "Background tasks dropped since start"
    )
    .expect("Failed to create background tasks dropped gauge")
});

/// Count one completed call
pub fn inc_requests(chain: &str, category: &str, outcome: &str) {
    REQUESTS_TOTAL
        .with_label_values(&[chain, category, outcome])
        .inc();
}

/// Observe the duration of a call that was dispatched upstream
///
/// # Arguments
/// * `chain` - Chain slug
/// * `category` - Routing category
/// * `result` - Outcome label
/// * `duration_secs` - Duration in seconds
pub fn observe_upstream_duration(chain: &str, category: &str, result: &str, duration_secs: f64) {
    UPSTREAM_REQUEST_DURATION
        .with_label_values(&[chain, category, result])
        .observe(duration_secs);
}

/// Record a cache outcome (HIT, MISS, BYPASS, NONE)
pub fn record_cache_operation(status: &str) {
    CACHE_OPERATIONS.with_label_values(&[status]).inc();
}

/// Count a rate limit rejection
pub fn inc_rate_limit_rejections(reason: &str) {
    RATE_LIMIT_REJECTIONS.with_label_values(&[reason]).inc();
}

/// Update cache utilization metrics
///
/// # Arguments
/// * `utilization_ratio` - Current cache utilization as ratio (0.0 to 1.0)
/// * `hit_rate` - Cache hit rate as ratio (0.0 to 1.0)
/// * `entry_count` - Current number of entries in cache
pub fn update_cache_metrics(utilization_ratio: f64, hit_rate: f64, entry_count: usize) {
    CACHE_UTILIZATION.set(utilization_ratio);
    CACHE_HIT_RATE.set(hit_rate);
    #[allow(clippy::cast_precision_loss)]
    CACHE_SIZE.set(entry_count as f64);
}

/// Telemetry sink that feeds Prometheus before handing records on
#[derive(Debug)]
pub struct PrometheusTelemetry {
    inner: Arc<dyn TelemetrySink>,
    request_log: Option<TracingTelemetrySink>,
}

impl PrometheusTelemetry {
    /// Wrap `inner`
    pub fn new(inner: Arc<dyn TelemetrySink>) -> Self {
        Self {
            inner,
            request_log: None,
        }
    }

    /// Also write one log line per call
    #[must_use]
    pub fn with_request_log(mut self, enabled: bool) -> Self {
        self.request_log = enabled.then_some(TracingTelemetrySink);
        self
    }
}

#[async_trait]
impl TelemetrySink for PrometheusTelemetry {
    async fn record(&self, metrics: RequestMetrics) -> StoreResult<()> {
        let chain = metrics.chain_label();
        let category = metrics.category.map_or("none", |category| category.as_str());
        let outcome = metrics.outcome.as_str();

        inc_requests(chain, category, outcome);
        record_cache_operation(metrics.cache_status.as_str());
        if metrics.category.is_some() && metrics.outcome != RequestOutcome::CacheHit {
            observe_upstream_duration(chain, category, outcome, metrics.latency.as_secs_f64());
        }

        if let Some(log) = &self.request_log {
            log.record(metrics.clone()).await?;
        }
        self.inner.record(metrics).await
    }

    async fn summary(&self, chain: &ChainSlug) -> StoreResult<Option<ChainSummary>> {
        self.inner.summary(chain).await
    }
}

/// Axum handler that exports metrics in Prometheus text format
pub async fn metrics_handler(State(state): State<ServerState>) -> Result<Response, ServerError> {
    if let Some(cache) = state.cache_store() {
        let stats = cache.stats();
        update_cache_metrics(stats.utilization_rate, stats.hit_rate, stats.entry_count);
    }
    BACKGROUND_TASKS_DROPPED
        .set(i64::try_from(state.gateway().dropped_background_tasks()).unwrap_or(i64::MAX));

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ServerError::Metrics {
            message: e.to_string(),
        })?;

    let body = String::from_utf8(buffer).map_err(|e| ServerError::Metrics {
        message: e.to_string(),
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        body,
    )
        .into_response())
}
