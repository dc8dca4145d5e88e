// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Pluggable backends for the gateway's external collaborators
//!
//! The gateway core never references a concrete backend. Each collaborator
//! is a narrow trait, and this crate ships in-memory and file-backed
//! implementations so a single instance runs without external services.
//!
//! # Architecture
//!
//! - **Chain configuration**: [`config_store::ConfigStore`] with [`MemoryConfigStore`] and [`FileConfigStore`]
//! - **Response cache**: [`cache_store::CacheStore`] with the TTL/LRU [`MemoryCacheStore`]
//! - **Telemetry**: [`telemetry::TelemetrySink`] with [`TracingTelemetrySink`] and the aggregating [`MemoryTelemetrySink`]
//! - **Plans**: [`plan_store::PlanStore`] mapping access tokens to plans
//! - **Public limiter**: [`public_limiter::PublicLimiter`] with the per-IP [`FixedWindowLimiter`]

pub mod cache_store;
pub mod config_store;
pub mod error;
pub mod plan_store;
pub mod public_limiter;
pub mod telemetry;

pub use cache_store::{CacheStore, CacheStoreStats, MemoryCacheStore};
pub use config_store::{ChainsFile, ConfigStore, FileConfigStore, MemoryConfigStore};
pub use error::{StoreError, StoreResult};
pub use plan_store::{MemoryPlanStore, PlanStore};
pub use public_limiter::{
    FixedWindowLimiter, PublicLimitConfig, PublicLimitDecision, PublicLimiter,
};
pub use telemetry::{
    ChainSummary, MAX_TRACKED_METHODS, MemoryTelemetrySink, OTHER_METHOD, RequestMetrics,
    RequestOutcome, TelemetrySink, TracingTelemetrySink, UNKNOWN_CHAIN,
};
