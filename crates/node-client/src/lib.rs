// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Upstream node client abstraction
//!
//! This crate provides the interface the gateway uses to forward a JSON-RPC
//! body to a single blockchain node, and an HTTP implementation built on
//! `reqwest`.
//!
//! # Core Abstractions
//!
//! - **`NodeClient` Trait**: one round trip to one node, object safe so the
//!   dispatcher can hold it as `Arc<dyn NodeClient>`
//! - **`NodeResponse`**: the fully buffered upstream answer
//! - **`NodeError`**: transport, timeout and non-success status failures
//!
//! Only the success range of HTTP statuses produces `Ok`; everything else is
//! an error the dispatcher may retry against the next candidate.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use url::Url;

pub mod http;

pub use http::{HttpNodeClient, NodeClientConfig};

/// Longest upstream error body kept for diagnostics
pub const MAX_ERROR_BODY_CHARS: usize = 512;

/// One round trip to one upstream node
#[async_trait]
pub trait NodeClient: Send + Sync + fmt::Debug {
    /// Forward `body` to `node` and return its answer
    ///
    /// # Errors
    ///
    /// Returns `NodeError::Status` when the node answers outside the 2xx
    /// range, `NodeError::Timeout` when it does not answer in time and
    /// `NodeError::Transport` for connection level failures.
    async fn send(&self, node: &Url, body: Bytes) -> Result<NodeResponse, NodeError>;
}

/// Successful, fully buffered upstream response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResponse {
    /// HTTP status code, always in the success range
    pub status: u16,
    /// Upstream `content-type`, if any
    pub content_type: Option<String>,
    /// Response body
    pub body: Bytes,
}

impl NodeResponse {
    /// A 200 response carrying a JSON body
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            content_type: Some("application/json".to_string()),
            body: body.into(),
        }
    }
}

/// Failure of a single node attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// Connection level failure (DNS, refused, reset, invalid body)
    #[error("transport error talking to {node}: {message}")]
    Transport {
        /// Node host
        node: String,
        /// Error message
        message: String,
    },

    /// Node did not answer in time
    #[error("{node} did not answer within {timeout_seconds} seconds")]
    Timeout {
        /// Node host
        node: String,
        /// Timeout in seconds
        timeout_seconds: u64,
    },

    /// Node answered with a non-success status
    #[error("{node} answered {status}: {body}")]
    Status {
        /// Node host
        node: String,
        /// HTTP status code
        status: u16,
        /// Truncated response body
        body: String,
    },
}

impl NodeError {
    /// Whether the node produced an HTTP answer, as opposed to a transport failure
    pub fn is_upstream_response(&self) -> bool {
        matches!(self, Self::Status { .. })
    }
}

/// Host portion of a node URL, used in logs and errors instead of the full
/// URL which may embed provider API keys
pub fn node_label(node: &Url) -> String {
    match (node.host_str(), node.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => node.scheme().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_label_hides_path_and_query() {
        let node: Url = "https://eth.provider.example/v2/secret-key?x=1".parse().unwrap();
        assert_eq!(node_label(&node), "eth.provider.example");

        let node: Url = "http://127.0.0.1:8545/".parse().unwrap();
        assert_eq!(node_label(&node), "127.0.0.1:8545");
    }

    #[test]
    fn error_classification() {
        let status = NodeError::Status {
            node: "a".to_string(),
            status: 500,
            body: "boom".to_string(),
        };
        assert!(status.is_upstream_response());
        assert_eq!(status.to_string(), "a answered 500: boom");

        let transport = NodeError::Transport {
            node: "a".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(!transport.is_upstream_response());
    }
}
