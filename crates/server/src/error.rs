// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error handling module
//!
//! Error types for server operations and their mapping to HTTP responses.
//! Rate limit rejections answer with a plain-text body naming the reason;
//! everything else answers with a small JSON object.

use std::net::SocketAddr;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use proxy_core::{DispatchError, GatewayError};
use shared_types::ChainSlugParseError;
use thiserror::Error;

use crate::metrics;

/// Error types for server operations
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration validation errors
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Network binding errors
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        /// Socket address that failed to bind
        address: SocketAddr,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Server startup errors
    #[error("Server startup failed: {source}")]
    Startup {
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Server shutdown errors
    #[error("Server shutdown failed: {source}")]
    Shutdown {
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Task join errors for async operations
    #[error("Task join error: {source}")]
    TaskJoin {
        /// Underlying tokio join error
        #[source]
        source: tokio::task::JoinError,
    },

    /// Chain segment of the path is not a valid slug
    #[error("invalid chain {chain:?}: {source}")]
    InvalidChain {
        /// Path segment as received
        chain: String,
        /// Why the slug was rejected
        #[source]
        source: ChainSlugParseError,
    },

    /// Path parameters could not be extracted
    #[error("invalid path: {message}")]
    InvalidPath {
        /// Rejection text
        message: String,
    },

    /// Metrics could not be encoded
    #[error("Metrics encoding failed: {message}")]
    Metrics {
        /// Error message
        message: String,
    },

    /// Gateway failure for one call
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    /// HTTP status this error answers with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Config { .. }
            | Self::Bind { .. }
            | Self::Startup { .. }
            | Self::Shutdown { .. }
            | Self::TaskJoin { .. }
            | Self::Metrics { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidChain { .. } | Self::InvalidPath { .. } => StatusCode::BAD_REQUEST,
            Self::Gateway(error) => gateway_status(error),
        }
    }
}

fn gateway_status(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::ChainNotFound { .. } => StatusCode::NOT_FOUND,
        GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        GatewayError::Dispatch(DispatchError::AllNodesFailed { .. }) => StatusCode::BAD_GATEWAY,
        GatewayError::Dispatch(
            DispatchError::NoNodesConfigured { .. } | DispatchError::Cancelled,
        ) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let Self::Gateway(GatewayError::RateLimited { reason }) = &self {
            metrics::inc_rate_limit_rejections(reason.as_str());
            return (status, reason.as_str()).into_response();
        }

        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16()
        }));
        (status, body).into_response()
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(source: tokio::task::JoinError) -> Self {
        Self::TaskJoin { source }
    }
}

#[cfg(test)]
mod tests {
    use node_client::NodeError;
    use proxy_core::RateLimitReason;
    use shared_types::{ChainSlug, RoutingCategory};

    use super::*;

    #[test]
    fn gateway_errors_map_to_statuses() {
        let cases = [
            (
                GatewayError::ChainNotFound {
                    chain: ChainSlug::new("nope").unwrap(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                GatewayError::RateLimited {
                    reason: RateLimitReason::MonthlyLimit,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                DispatchError::NoNodesConfigured {
                    category: RoutingCategory::Archive,
                }
                .into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                DispatchError::AllNodesFailed {
                    category: RoutingCategory::Standard,
                    attempts: 3,
                    last_error: Some(NodeError::Timeout {
                        node: "a.example".to_string(),
                        timeout_seconds: 10,
                    }),
                }
                .into(),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ServerError::from(error).status_code(), status);
        }
    }

    #[test]
    fn invalid_chain_is_bad_request() {
        let error = ServerError::InvalidChain {
            chain: "ETH".to_string(),
            source: ChainSlug::new("ETH").unwrap_err(),
        };
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rate_limited_body_is_the_reason() {
        let response = ServerError::from(GatewayError::RateLimited {
            reason: RateLimitReason::UserNotFound,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        assert_eq!(&body[..], b"user_not_found");
    }
}
