// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Routes module
//!
//! Route configuration for the gateway: operational endpoints, API
//! documentation and the chain-addressed JSON-RPC endpoints.

pub mod handlers;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use handlers::{authenticated_rpc_handler, chain_summary_handler, health_handler, rpc_handler};

use crate::{
    metrics::metrics_handler,
    middleware::chain_span_middleware,
    openapi::{openapi_spec, swagger_ui},
    state::ServerState,
};

/// Create application routes
///
/// Bodies of JSON-RPC calls larger than `max_body_bytes` are rejected with
/// 413 before reaching the gateway.
pub fn create_routes(max_body_bytes: usize) -> Router<ServerState> {
    // Static paths take precedence over the chain parameter.
    let ops_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler));

    let docs_routes = Router::new()
        .route("/api-doc/openapi.json", get(openapi_spec))
        .route("/swagger-ui", get(swagger_ui));

    let rpc_routes = Router::new()
        .route("/{chain}", post(rpc_handler).get(chain_summary_handler))
        .route("/{chain}/{token}", post(authenticated_rpc_handler))
        .route_layer(middleware::from_fn(chain_span_middleware))
        .layer(DefaultBodyLimit::max(max_body_bytes));

    Router::new()
        .merge(ops_routes)
        .merge(docs_routes)
        .merge(rpc_routes)
}
