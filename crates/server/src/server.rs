// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server implementation module
//!
//! This module provides the main server struct for the gateway, including
//! wiring the gateway from configuration, router configuration, periodic
//! maintenance and coordinated graceful shutdown using `CancellationToken`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{Router, http::HeaderName};
use backends::{
    CacheStore, ConfigStore, FileConfigStore, FixedWindowLimiter, MemoryCacheStore,
    MemoryConfigStore, MemoryPlanStore, MemoryTelemetrySink,
};
use hyper::Request;
use node_client::HttpNodeClient;
use proxy_core::{Gateway, GatewayParts};
use tokio::{net::TcpListener, time::timeout};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, error, info, info_span, warn};

use crate::{
    config::ServerConfig,
    error::{ServerError, ServerResult},
    metrics::PrometheusTelemetry,
    routes::create_routes,
    state::ServerState,
};

// Server constants
const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_FORCE_SHUTDOWN_TIMEOUT_SECONDS: u64 = 5;
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);
// Longer than a month so monthly quotas survive pruning.
const RATE_LIMIT_MAX_IDLE: Duration = Duration::from_secs(40 * 24 * 60 * 60);

/// Configuration for server shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Maximum time to wait for in-flight requests before closing connections
    pub graceful_timeout: Duration,
    /// Maximum time to wait for queued background work after the listener stops
    pub force_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS),
            force_timeout: Duration::from_secs(DEFAULT_FORCE_SHUTDOWN_TIMEOUT_SECONDS),
        }
    }
}

/// Main server struct
#[derive(Debug)]
pub struct Server {
    /// Server configuration
    config: ServerConfig,
    /// Application router
    router: Router,
    /// Server state
    state: ServerState,
    /// Cancellation token for coordinated shutdown
    cancellation_token: CancellationToken,
    /// Configuration for coordinated shutdown
    graceful_shutdown_config: ShutdownConfig,
}

impl Server {
    /// Create new server instance
    ///
    /// Builds the gateway from the configured stores. Must be called from
    /// within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if the configuration is invalid or the
    /// node client cannot be built.
    pub fn new(config: ServerConfig, shutdown_config: ShutdownConfig) -> ServerResult<Self> {
        let cache_store = config
            .cache
            .enabled
            .then(|| Arc::new(MemoryCacheStore::new(config.cache.capacity)));
        let parts = Self::create_gateway_parts(&config, cache_store.clone())?;
        Self::with_gateway_parts(config, shutdown_config, parts, cache_store)
    }

    /// Create gateway collaborators from server configuration
    fn create_gateway_parts(
        config: &ServerConfig,
        cache_store: Option<Arc<MemoryCacheStore>>,
    ) -> ServerResult<GatewayParts> {
        let config_store: Arc<dyn ConfigStore> = match &config.chains_file {
            Some(path) => {
                info!(path = %path.display(), "loading chains from file");
                Arc::new(FileConfigStore::new(path))
            }
            None => {
                info!(chains = config.chains.len(), "using inline chain definitions");
                Arc::new(MemoryConfigStore::with_chains(config.chains.clone()))
            }
        };

        let plan_store = MemoryPlanStore::new();
        for (token, plan) in config.token_plans()? {
            plan_store.assign(token, plan);
        }

        let node_client =
            HttpNodeClient::new(config.node_client.clone()).map_err(|e| ServerError::Config {
                message: format!("node client: {e}"),
            })?;

        let telemetry = PrometheusTelemetry::new(Arc::new(MemoryTelemetrySink::new()))
            .with_request_log(config.telemetry.log_requests);

        Ok(GatewayParts {
            config_store,
            cache_store: cache_store.map(|store| store as Arc<dyn CacheStore>),
            plan_store: Arc::new(plan_store),
            public_limiter: Arc::new(FixedWindowLimiter::new(config.rate_limiting.clone())),
            node_client: Arc::new(node_client),
            telemetry: Arc::new(telemetry),
        })
    }

    /// Create server with custom gateway collaborators for dependency injection
    ///
    /// `cache_store` is only used for cache statistics and should be the
    /// store behind `parts.cache_store`.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if the configuration is invalid.
    pub fn with_gateway_parts(
        config: ServerConfig,
        graceful_shutdown_config: ShutdownConfig,
        parts: GatewayParts,
        cache_store: Option<Arc<MemoryCacheStore>>,
    ) -> ServerResult<Self> {
        config.validate()?;

        let gateway = Arc::new(Gateway::new(&config.proxy, parts));
        let cancellation_token = CancellationToken::new();
        let state = ServerState::new(
            config.clone(),
            gateway,
            cache_store,
            cancellation_token.child_token(),
        );
        let router = Self::create_router(state.clone());

        Ok(Self {
            config,
            router,
            state,
            cancellation_token,
            graceful_shutdown_config,
        })
    }

    /// Create application router with middleware
    fn create_router(state: ServerState) -> Router {
        let timeout_duration = state.config().timeout_seconds.value();
        let max_body_bytes = state.config().max_body_bytes;

        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                    if let Some(request_id) = req.headers().get(REQUEST_ID_HEADER) {
                        info_span!("http_request", ?request_id)
                    } else {
                        error!("failed to extract id from request");
                        info_span!("http_request", request_id = "unknown")
                    }
                }),
            )
            .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
            .layer(CorsLayer::permissive())
            .layer(TimeoutLayer::new(timeout_duration));

        create_routes(max_body_bytes)
            .layer(middleware)
            .with_state(state)
    }

    /// Run the server with coordinated graceful shutdown
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if unable to bind to the configured address,
    /// or `ServerError::Startup` if the server fails to start.
    pub async fn run(self) -> ServerResult<()> {
        let (listener, actual_addr) = self.bind().await?;

        info!(
            address = %actual_addr,
            environment = %self.config.environment,
            caching = self.config.cache.enabled,
            "NullRPC gateway starting",
        );

        let shutdown_token = self.cancellation_token.clone();
        tokio::spawn(async move {
            info!("spawning the graceful shutdown task");
            Self::shutdown_signal_handler(shutdown_token).await;
        });
        Self::spawn_maintenance(&self.state, self.cancellation_token.clone());

        let cancellation_token = self.cancellation_token.clone();
        let serve_token = cancellation_token.clone();
        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        let mut serve_task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { serve_token.cancelled().await })
                .await
        });

        let server_result = tokio::select! {
            joined = &mut serve_task => joined?,
            () = cancellation_token.cancelled() => {
                match timeout(self.graceful_shutdown_config.graceful_timeout, &mut serve_task).await {
                    Ok(joined) => joined?,
                    Err(_) => {
                        warn!("in-flight requests did not finish in time, closing connections");
                        serve_task.abort();
                        Ok(())
                    }
                }
            }
        };

        Self::drain(&self.state, self.graceful_shutdown_config.force_timeout).await;

        if let Err(e) = server_result {
            error!(error = ?e, "Server error during shutdown");
            Err(ServerError::Shutdown { source: e })
        } else {
            info!("NullRPC gateway shut down gracefully");
            Ok(())
        }
    }

    async fn bind(&self) -> ServerResult<(TcpListener, SocketAddr)> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: addr,
                source,
            })?;

        let actual_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Startup { source })?;
        Ok((listener, actual_addr))
    }

    /// Periodically drop idle rate limit state and expired cache entries
    fn spawn_maintenance(state: &ServerState, cancellation_token: CancellationToken) {
        let gateway = Arc::clone(state.gateway());
        let cache_store = state.cache_store().cloned();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    () = cancellation_token.cancelled() => break,
                    _ = interval.tick() => {
                        let pruned = gateway.prune_rate_limits(RATE_LIMIT_MAX_IDLE);
                        let expired = cache_store.as_ref().map_or(0, |store| store.cleanup_expired());
                        if pruned > 0 || expired > 0 {
                            debug!(pruned, expired, "maintenance pass finished");
                        }
                    }
                }
            }
            debug!("maintenance task stopped");
        });
    }

    /// Wait for queued cache writes and telemetry, bounded by `limit`
    async fn drain(state: &ServerState, limit: Duration) {
        if timeout(limit, state.gateway().shutdown()).await.is_err() {
            warn!(
                timeout_secs = limit.as_secs(),
                "background tasks did not drain in time"
            );
        }
    }

    /// Handle shutdown signals and trigger coordinated cancellation
    ///
    /// This function listens for SIGINT (Ctrl+C) and SIGTERM signals,
    /// and cancels the provided cancellation token when received.
    ///
    /// # Arguments
    ///
    /// * `cancellation_token` - Token to cancel when shutdown signal is received
    async fn shutdown_signal_handler(cancellation_token: CancellationToken) {
        let signal_received = async {
            #[cfg(unix)]
            #[allow(clippy::expect_used)]
            {
                use tokio::signal::unix::{SignalKind, signal};

                let mut sigterm =
                    signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
                let mut sigint =
                    signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

                tokio::select! {
                    _ = sigterm.recv() => "SIGTERM",
                    _ = sigint.recv() => "SIGINT",
                }
            }

            #[cfg(not(unix))]
            #[allow(clippy::expect_used)]
            {
                tokio::signal::ctrl_c()
                    .await
                    .expect("Failed to install CTRL+C signal handler");
                "CTRL+C"
            }
        };

        tokio::select! {
            signal_name = signal_received => {
                warn!(signal = signal_name, "shutdown signal received, cancelling all operations");
                cancellation_token.cancel();
            },
            () = cancellation_token.cancelled() => {
                debug!("cancellation token already cancelled, shutdown signal handler exiting");
            }
        }
    }

    /// Returns a clone of the cancellation token for coordinated shutdown
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Initiates graceful shutdown by cancelling the server's cancellation token
    pub fn shutdown(&self) {
        info!("programmatic shutdown requested");
        self.cancellation_token.cancel();
    }

    /// Run server for testing, returns the bound address
    ///
    /// Cancelling the returned token stops the listener and drains the
    /// background queue.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if unable to bind to the configured address.
    pub async fn run_for_testing(self) -> ServerResult<(SocketAddr, CancellationToken)> {
        let (listener, actual_addr) = self.bind().await?;

        let token = self.cancellation_token.clone();
        let serve_token = token.clone();
        let state = self.state;
        let force_timeout = self.graceful_shutdown_config.force_timeout;
        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { serve_token.cancelled().await })
                .await
            {
                error!(error = ?e, "test server failed");
            }
            Self::drain(&state, force_timeout).await;
        });

        Ok((actual_addr, token))
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get server state for testing
    pub fn state(&self) -> &ServerState {
        &self.state
    }
}
