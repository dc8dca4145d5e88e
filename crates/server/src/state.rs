// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server state management module
//!
//! Shared application state for the gateway server: configuration, the
//! gateway itself and coordinated cancellation.

use std::sync::Arc;

use backends::MemoryCacheStore;
use proxy_core::Gateway;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use crate::config::{Environment, ServerConfig};

/// Shared application state with cancellation token support
#[derive(Debug, Clone)]
pub struct ServerState {
    /// Server configuration
    config: Arc<ServerConfig>,
    /// Gateway serving JSON-RPC calls
    gateway: Arc<Gateway>,
    /// In-memory response store, when caching is enabled
    cache_store: Option<Arc<MemoryCacheStore>>,
    /// Cancellation token for coordinated shutdown
    pub cancellation_token: CancellationToken,
}

impl ServerState {
    /// Create new server state
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration
    /// * `gateway` - Gateway serving JSON-RPC calls
    /// * `cache_store` - Response store backing the gateway cache, for statistics
    /// * `cancellation_token` - Token for coordinated cancellation
    pub fn new(
        config: ServerConfig,
        gateway: Arc<Gateway>,
        cache_store: Option<Arc<MemoryCacheStore>>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            config: Arc::new(config),
            gateway,
            cache_store,
            cancellation_token,
        }
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Gateway serving JSON-RPC calls
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// In-memory response store, if caching is enabled
    pub fn cache_store(&self) -> Option<&Arc<MemoryCacheStore>> {
        self.cache_store.as_ref()
    }

    /// Current service health
    pub async fn health_check(&self) -> HealthCheck {
        let chains = self
            .gateway
            .loaded_chains()
            .await
            .into_iter()
            .map(|slug| slug.to_string())
            .collect();

        let status = if self.cancellation_token.is_cancelled() {
            HealthStatus::Down {
                reason: Box::from("shutting down"),
            }
        } else {
            HealthStatus::Up
        };

        HealthCheck {
            status,
            version: Box::from(env!("CARGO_PKG_VERSION")),
            environment: self.config.environment,
            timestamp: chrono::Utc::now().to_rfc3339(),
            caching: self.gateway.caching_enabled(),
            chains,
        }
    }
}

/// Health status of the service
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum HealthStatus {
    /// Service is fully operational and responding normally
    Up,

    /// Service is not accepting new work
    Down {
        /// Human-readable explanation of why the service is down
        reason: Box<str>,
    },
}

/// Health check status
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthCheck {
    /// Service status
    pub status: HealthStatus,
    /// Service version
    pub version: Box<str>,
    /// Environment
    #[schema(value_type = String)]
    pub environment: Environment,
    /// Timestamp
    pub timestamp: String,
    /// Whether responses are cached
    pub caching: bool,
    /// Chains loaded so far
    pub chains: Vec<String>,
}
