// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! NullRPC Server Implementation
//!
//! This crate provides the HTTP front of the NullRPC gateway, built with Axum:
//! configuration loading, the chain-addressed JSON-RPC routes, Prometheus
//! metrics and graceful shutdown.
//!
//! # Module Structure
//!
//! - [`config`]: Server configuration and environment management with hierarchical loading
//! - [`error`]: Error types and HTTP response handling with proper status codes
//! - [`extractors`]: Chain slug, access token and client address extraction
//! - [`metrics`]: Prometheus metrics and the telemetry decorator feeding them
//! - [`state`]: Shared application state management with cancellation token support
//! - [`server`]: Main server implementation, lifecycle, and coordinated shutdown
//! - [`routes`]: Route configuration and HTTP request handlers
//! - [`middleware`]: Chain context for request tracing
//! - [`openapi`]: `OpenAPI` specification and Swagger UI endpoints for API documentation
//!
//! # Endpoints
//!
//! - `POST /{chain}`: forward a call, limited per client address
//! - `POST /{chain}/{token}`: forward a call, limited by the token's plan
//! - `GET /{chain}`: traffic summary of a chain
//! - `GET /health`, `GET /metrics`, `GET /api-doc/openapi.json`, `GET /swagger-ui`
//!
//! Every forwarded call answers with an `X-NullRPC-Cache` header of `HIT`,
//! `MISS`, `BYPASS` or `NONE`.

pub mod config;
pub mod error;
pub mod extractors;
pub mod metrics;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{CacheConfig, Environment, ServerConfig, TelemetryConfig};
pub use error::{ServerError, ServerResult};
pub use server::{Server, ShutdownConfig};
pub use state::{HealthCheck, HealthStatus, ServerState};
