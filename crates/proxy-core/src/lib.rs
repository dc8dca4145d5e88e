// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Routing core of the NullRPC gateway
//!
//! This crate turns an inbound JSON-RPC body addressed to a chain into an
//! upstream answer. It classifies each call, decides whether and for how
//! long the answer may be cached, enforces tiered rate limits and sends the
//! call to one of several candidate nodes with bounded retry and fallback.
//!
//! # Architecture
//!
//! - [`classifier`]: method and params to standard, archive or MEV routing
//! - [`cache_policy`]: TTL classes and cache fingerprints
//! - [`response_cache`]: fingerprint-keyed cache on top of a `CacheStore`
//! - [`rate_limiter`]: token buckets with a monthly quota per access token
//! - [`registry`]: lazily loaded, periodically refreshed chain configurations
//! - [`dispatcher`]: random node selection with per-pool attempt budgets
//! - [`tasks`]: bounded queue for cache writes and telemetry
//! - [`gateway`]: orchestration of all of the above per call
//!
//! Storage, plans, telemetry and the public limiter are traits from the
//! `backends` crate; the node transport is the `node-client` crate.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use backends::{
//!     FixedWindowLimiter, MemoryCacheStore, MemoryConfigStore, MemoryPlanStore,
//!     PublicLimitConfig, TracingTelemetrySink,
//! };
//! use bytes::Bytes;
//! use node_client::{HttpNodeClient, NodeClientConfig};
//! use proxy_core::{Gateway, GatewayParts, GatewayRequest, ProxyConfig, RateLimitIdentity};
//! use shared_types::{ChainConfig, ChainSlug};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let eth = ChainSlug::new("eth")?;
//! let chains = MemoryConfigStore::with_chains([ChainConfig::new(
//!     eth.clone(),
//!     1,
//!     vec!["https://eth.example/".parse()?],
//! )]);
//!
//! let gateway = Gateway::new(
//!     &ProxyConfig::default(),
//!     GatewayParts {
//!         config_store: Arc::new(chains),
//!         cache_store: Some(Arc::new(MemoryCacheStore::default())),
//!         plan_store: Arc::new(MemoryPlanStore::new()),
//!         public_limiter: Arc::new(FixedWindowLimiter::new(PublicLimitConfig::default())),
//!         node_client: Arc::new(HttpNodeClient::new(NodeClientConfig::default())?),
//!         telemetry: Arc::new(TracingTelemetrySink),
//!     },
//! );
//!
//! let response = gateway
//!     .handle(
//!         GatewayRequest {
//!             chain: eth,
//!             identity: RateLimitIdentity::Ip("127.0.0.1".parse()?),
//!             body: Bytes::from_static(br#"{"jsonrpc":"2.0","id":1,"method":"eth_chainId"}"#),
//!         },
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! println!("{} {}", response.cache_status, String::from_utf8_lossy(&response.body));
//!
//! gateway.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod block;
pub mod cache_policy;
pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod rate_limiter;
pub mod registry;
pub mod response_cache;
pub mod tasks;

pub use cache_policy::{CacheClass, CacheDecision, CacheFingerprint, CachePolicy};
pub use classifier::{classify, classify_envelope};
pub use config::{BackgroundConfig, DEFAULT_RECENT_BLOCK_THRESHOLD, DispatchBudgets, ProxyConfig};
pub use dispatcher::{DispatchOutcome, NodeDispatcher};
pub use error::{DispatchError, GatewayError, GatewayResult};
pub use gateway::{Gateway, GatewayParts, GatewayRequest, GatewayResponse, JSON_CONTENT_TYPE};
pub use rate_limiter::{
    RateLimitDecision, RateLimitIdentity, RateLimitReason, RateLimitSnapshot, RateLimiter,
};
pub use registry::ChainRegistry;
pub use response_cache::ResponseCache;
pub use tasks::BackgroundTasks;
