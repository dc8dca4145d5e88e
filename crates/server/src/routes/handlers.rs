// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP request handlers module
//!
//! Health checks, the JSON-RPC forwarding endpoints and per-chain traffic
//! summaries. Forwarding handlers derive their cancellation token from the
//! server's so in-flight dispatch stops on shutdown.

use axum::{
    Json,
    extract::State,
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use backends::ChainSummary;
use bytes::Bytes;
use proxy_core::{GatewayRequest, GatewayResponse, JSON_CONTENT_TYPE, RateLimitIdentity};
use shared_types::{CacheStatus, ChainSlug};
use tracing::warn;

use crate::{
    error::ServerError,
    extractors::{ChainPath, ClientIp, TokenPath},
    state::{HealthCheck, ServerState},
};

/// Health check endpoint handler
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    summary = "Health check endpoint",
    description = "Returns the current health status of the gateway including version, environment, whether caching is enabled and the chains loaded so far.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthCheck)
    )
)]
pub async fn health_handler(State(state): State<ServerState>) -> Json<HealthCheck> {
    Json(state.health_check().await)
}

/// Forward a JSON-RPC call for an anonymous caller
///
/// The caller is rate limited by client address.
///
/// # Errors
///
/// Returns `ServerError` for unknown chains, exhausted limits and upstream
/// failures.
#[utoipa::path(
    post,
    path = "/{chain}",
    tag = "rpc",
    summary = "Forward a JSON-RPC call",
    description = "Forwards a JSON-RPC request or batch to a node of the addressed chain. The body is passed through verbatim; the X-NullRPC-Cache header reports HIT, MISS, BYPASS or NONE.",
    params(("chain" = String, Path, description = "Chain slug", example = "eth")),
    request_body(content = Object, content_type = "application/json", description = "JSON-RPC request or batch"),
    responses(
        (status = 200, description = "Answer of the upstream node, or a cached answer"),
        (status = 400, description = "Invalid chain slug", body = String),
        (status = 404, description = "Chain is not configured", body = String),
        (status = 413, description = "Body exceeds the configured limit"),
        (status = 429, description = "Rate limited, the body names the reason", body = String),
        (status = 502, description = "Every node of the pool failed", body = String),
        (status = 503, description = "No nodes configured for the category, or shutting down", body = String)
    )
)]
pub async fn rpc_handler(
    State(state): State<ServerState>,
    ChainPath(chain): ChainPath,
    ClientIp(ip): ClientIp,
    body: Bytes,
) -> Result<Response, ServerError> {
    forward(&state, chain, RateLimitIdentity::Ip(ip), body).await
}

/// Forward a JSON-RPC call for a token holder
///
/// The caller is rate limited by the plan assigned to the token.
///
/// # Errors
///
/// Returns `ServerError` for unknown chains, unknown tokens, exhausted limits
/// and upstream failures.
#[utoipa::path(
    post,
    path = "/{chain}/{token}",
    tag = "rpc",
    summary = "Forward a JSON-RPC call with an access token",
    description = "Same as the anonymous endpoint, but limits are taken from the plan of the token. Unknown tokens answer 429 with body user_not_found.",
    params(
        ("chain" = String, Path, description = "Chain slug", example = "eth"),
        ("token" = String, Path, description = "Access token")
    ),
    request_body(content = Object, content_type = "application/json", description = "JSON-RPC request or batch"),
    responses(
        (status = 200, description = "Answer of the upstream node, or a cached answer"),
        (status = 400, description = "Invalid chain slug", body = String),
        (status = 404, description = "Chain is not configured", body = String),
        (status = 413, description = "Body exceeds the configured limit"),
        (status = 429, description = "Rate limited, the body names the reason", body = String),
        (status = 502, description = "Every node of the pool failed", body = String),
        (status = 503, description = "No nodes configured for the category, or shutting down", body = String)
    )
)]
pub async fn authenticated_rpc_handler(
    State(state): State<ServerState>,
    TokenPath { chain, token }: TokenPath,
    body: Bytes,
) -> Result<Response, ServerError> {
    forward(&state, chain, RateLimitIdentity::Token(token), body).await
}

/// Traffic summary of a chain
///
/// # Errors
///
/// Returns `ServerError` if the chain is not configured.
#[utoipa::path(
    get,
    path = "/{chain}",
    tag = "rpc",
    summary = "Traffic summary of a chain",
    description = "Aggregated call counts per method, cache status and outcome, with the mean latency. A configured chain without traffic yields an empty summary.",
    params(("chain" = String, Path, description = "Chain slug", example = "eth")),
    responses(
        (status = 200, description = "Summary of recorded traffic", body = ChainSummary),
        (status = 400, description = "Invalid chain slug", body = String),
        (status = 404, description = "Chain is not configured", body = String)
    )
)]
pub async fn chain_summary_handler(
    State(state): State<ServerState>,
    ChainPath(chain): ChainPath,
) -> Result<Json<ChainSummary>, ServerError> {
    Ok(Json(state.gateway().summary(&chain).await?))
}

async fn forward(
    state: &ServerState,
    chain: ChainSlug,
    identity: RateLimitIdentity,
    body: Bytes,
) -> Result<Response, ServerError> {
    let cancel = state.cancellation_token.child_token();
    let request = GatewayRequest {
        chain,
        identity,
        body,
    };
    let response = state.gateway().handle(request, &cancel).await?;
    Ok(rpc_response(response))
}

/// HTTP response for a gateway answer
///
/// Keeps the upstream status and content type; the cache outcome is always
/// reported in `X-NullRPC-Cache`.
pub fn rpc_response(answer: GatewayResponse) -> Response {
    let status = StatusCode::from_u16(answer.status).unwrap_or_else(|_| {
        warn!(status = answer.status, "upstream answered with an invalid status");
        StatusCode::BAD_GATEWAY
    });

    let content_type = answer
        .content_type
        .as_deref()
        .and_then(|value| HeaderValue::from_str(value).ok())
        .unwrap_or_else(|| HeaderValue::from_static(JSON_CONTENT_TYPE));

    let mut response = (status, answer.body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(
        HeaderName::from_static(CacheStatus::HEADER_NAME),
        cache_header(answer.cache_status),
    );
    response
}

fn cache_header(status: CacheStatus) -> HeaderValue {
    HeaderValue::from_static(status.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(status: u16, content_type: Option<&str>, cache_status: CacheStatus) -> GatewayResponse {
        GatewayResponse {
            body: Bytes::from_static(br#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#),
            status,
            content_type: content_type.map(str::to_string),
            cache_status,
            category: None,
        }
    }

    #[test]
    fn upstream_status_and_content_type_are_kept() {
        let response = rpc_response(answer(
            503,
            Some("application/json; charset=utf-8"),
            CacheStatus::Miss,
        ));

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        assert_eq!(response.headers()[CacheStatus::HEADER_NAME], "MISS");
    }

    #[test]
    fn missing_content_type_defaults_to_json() {
        let response = rpc_response(answer(200, None, CacheStatus::Hit));

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], JSON_CONTENT_TYPE);
        assert_eq!(response.headers()[CacheStatus::HEADER_NAME], "HIT");
    }

    #[test]
    fn invalid_upstream_status_is_bad_gateway() {
        let response = rpc_response(answer(42, None, CacheStatus::None));
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers()[CacheStatus::HEADER_NAME], "NONE");
    }
}
