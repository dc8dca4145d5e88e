// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP node client
//!
//! Forwards request bodies with a fixed, minimal header set. No caller
//! headers, credentials or identity are ever passed upstream.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, trace};
use url::Url;

use crate::{MAX_ERROR_BODY_CHARS, NodeClient, NodeError, NodeResponse, node_label};

/// Configuration for the HTTP node client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeClientConfig {
    /// Per-attempt timeout in seconds
    pub timeout_seconds: u64,
    /// Connect timeout in seconds
    pub connect_timeout_seconds: u64,
}

impl Default for NodeClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            connect_timeout_seconds: 3,
        }
    }
}

/// `reqwest` backed node client
#[derive(Debug, Clone)]
pub struct HttpNodeClient {
    client: Client,
    config: NodeClientConfig,
}

impl HttpNodeClient {
    /// Create a new HTTP node client
    ///
    /// # Errors
    ///
    /// Returns `NodeError::Transport` if the HTTP client cannot be built.
    pub fn new(config: NodeClientConfig) -> Result<Self, NodeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .map_err(|e| NodeError::Transport {
                node: "local".to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, config })
    }

    /// Client configuration
    pub fn config(&self) -> &NodeClientConfig {
        &self.config
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn send(&self, node: &Url, body: Bytes) -> Result<NodeResponse, NodeError> {
        let label = node_label(node);
        trace!(node = %label, bytes = body.len(), "forwarding request upstream");

        let request = self
            .client
            .post(node.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .body(body);

        let response = timeout(
            Duration::from_secs(self.config.timeout_seconds),
            request.send(),
        )
        .await
        .map_err(|_| NodeError::Timeout {
            node: label.clone(),
            timeout_seconds: self.config.timeout_seconds,
        })?
        .map_err(|e| classify_reqwest_error(&label, &e, self.config.timeout_seconds))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(&label, &e, self.config.timeout_seconds))?;

        if status.is_success() {
            debug!(node = %label, status = status.as_u16(), "upstream answered");
            Ok(NodeResponse {
                status: status.as_u16(),
                content_type,
                body,
            })
        } else {
            let text = String::from_utf8_lossy(&body);
            Err(NodeError::Status {
                node: label,
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            })
        }
    }
}

fn classify_reqwest_error(label: &str, error: &reqwest::Error, timeout_seconds: u64) -> NodeError {
    if error.is_timeout() {
        NodeError::Timeout {
            node: label.to_string(),
            timeout_seconds,
        }
    } else {
        NodeError::Transport {
            node: label.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = NodeClientConfig::default();
        assert_eq!(config.timeout_seconds, 10);
        assert_eq!(config.connect_timeout_seconds, 3);
    }

    #[test]
    fn client_creation() {
        let client = HttpNodeClient::new(NodeClientConfig::default()).unwrap();
        assert_eq!(client.config().timeout_seconds, 10);
    }
}
