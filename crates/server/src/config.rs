// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server configuration module
//!
//! Configuration structures and loading logic for the gateway server,
//! supporting different environments and validation of configuration
//! parameters.

use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use anyhow::{Result, anyhow, ensure};
use backends::{ChainsFile, MemoryCacheStore, PublicLimitConfig};
use config::{Config, ConfigError, Environment as ConfigEnv, File};
use node_client::NodeClientConfig;
use proxy_core::ProxyConfig;
use serde::{Deserialize, Deserializer, Serialize, de};
use shared_types::{ChainConfig, Plan};

use crate::error::{ServerError, ServerResult};

/// Default limit on inbound request bodies
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// A validated server port that ensures the value is appropriate for the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerPort {
    port: u16,
    environment: Environment,
}

impl ServerPort {
    /// Create a new `ServerPort`, ensuring it's valid for the given environment
    ///
    /// # Errors
    ///
    /// Returns an error if the port is 0 in non-testing environments
    pub fn new(port: u16, environment: Environment) -> Result<Self> {
        if port == 0 && environment != Environment::Testing {
            return Err(anyhow!("port cannot be 0 in non-testing environments"));
        }
        Ok(Self { port, environment })
    }

    /// Default port for development
    pub const fn default_development() -> Self {
        Self {
            port: 8545,
            environment: Environment::Development,
        }
    }

    /// Testing port (port 0)
    pub const fn testing() -> Self {
        Self {
            port: 0,
            environment: Environment::Testing,
        }
    }

    /// Get the port value
    pub fn value(&self) -> u16 {
        self.port
    }
}

impl<'de> Deserialize<'de> for ServerPort {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let port = u16::deserialize(deserializer)?;
        // validated against the environment once loading is complete
        Ok(Self {
            port,
            environment: Environment::Development,
        })
    }
}

/// A validated timeout duration in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeoutSeconds(Duration);

impl TimeoutSeconds {
    /// Create a new `TimeoutSeconds`, ensuring the value is within valid bounds
    ///
    /// # Errors
    ///
    /// Returns an error if timeout is 0 or greater than 300 seconds
    pub fn new(seconds: u64) -> Result<Self> {
        ensure!(seconds != 0, "timeout must be greater than 0");
        ensure!(seconds <= 300, "timeout cannot exceed 300");
        Ok(Self(Duration::from_secs(seconds)))
    }

    /// Default timeout (30 seconds)
    pub const fn default_value() -> Self {
        Self(Duration::from_secs(30))
    }

    /// Testing timeout (5 seconds)
    pub const fn testing() -> Self {
        Self(Duration::from_secs(5))
    }

    /// Get the timeout value
    pub fn value(&self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for TimeoutSeconds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = u64::deserialize(deserializer)?;
        Self::new(seconds).map_err(|e| de::Error::custom(e.to_string()))
    }
}

impl Default for TimeoutSeconds {
    fn default() -> Self {
        Self::default_value()
    }
}

/// Environment types for configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production environment
    Production,
    /// Development environment
    Development,
    /// Testing environment
    Testing,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
            Environment::Testing => write!(f, "testing"),
        }
    }
}

/// Response cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether responses are cached at all
    pub enabled: bool,
    /// Maximum number of cached responses
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: MemoryCacheStore::DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Telemetry settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Write one structured log line per call
    pub log_requests: bool,
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Server configuration for different environments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    pub host: IpAddr,
    /// Server port (validated for environment compatibility)
    pub port: ServerPort,
    /// Request timeout in seconds (validated range: 1-300)
    pub timeout_seconds: TimeoutSeconds,
    /// Environment type
    pub environment: Environment,
    /// Largest accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Take the client IP from `X-Forwarded-For`
    #[serde(default)]
    pub trusted_proxies: bool,
    /// Per-IP limiter for public endpoints
    #[serde(default)]
    pub rate_limiting: PublicLimitConfig,
    /// Gateway core tunables
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// YAML or JSON file of chain definitions, re-read on refresh
    #[serde(default)]
    pub chains_file: Option<PathBuf>,
    /// Inline chain definitions, used when no chains file is set
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    /// Plans in addition to the built-in ones
    #[serde(default)]
    pub plans: Vec<Plan>,
    /// Access token to plan name
    #[serde(default)]
    pub tokens: HashMap<String, String>,
    /// Response cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// Upstream HTTP client
    #[serde(default)]
    pub node_client: NodeClientConfig,
    /// Per-call telemetry
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: ServerPort::default_development(),
            timeout_seconds: TimeoutSeconds::default(),
            environment: Environment::Development,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            trusted_proxies: false,
            rate_limiting: PublicLimitConfig::default(),
            proxy: ProxyConfig::default(),
            chains_file: None,
            chains: Vec::new(),
            plans: Vec::new(),
            tokens: HashMap::new(),
            cache: CacheConfig::default(),
            node_client: NodeClientConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment variables and optional configuration files
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if configuration is invalid or cannot be loaded.
    pub fn from_env() -> ServerResult<Self> {
        let config = Self::load().map_err(|e| ServerError::Config {
            message: format!("failed to load configuration: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration using the config crate with hierarchical sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. Configuration file (config.json)
    /// 3. Environment-specific files (config.{env}.json)
    /// 4. Environment variables with `SERVER_` prefix, nested keys separated
    ///    by `__` (e.g. `SERVER_PROXY__SYNC_INTERVAL=30`)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let env_var = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut config_builder = Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 8545)?
            .set_default("timeout_seconds", 30)?
            .set_default("environment", "development")?
            .add_source(File::with_name("config.json").required(false))
            .add_source(
                File::with_name(&format!("config.{}.json", env_var.to_lowercase())).required(false),
            )
            .add_source(
                ConfigEnv::with_prefix("SERVER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if std::env::var("ENVIRONMENT").is_ok() {
            config_builder = config_builder.set_override("environment", env_var.to_lowercase())?;
        }

        let config = config_builder.build()?;
        let mut server_config: Self = config.try_deserialize()?;

        server_config.port = ServerPort::new(server_config.port.value(), server_config.environment)
            .map_err(|e| ConfigError::Message(format!("invalid port configuration: {e}")))?;

        Ok(server_config)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` for duplicate chains, empty dispatch
    /// budgets, a burst multiplier below 1 or tokens bound to unknown plans.
    pub fn validate(&self) -> ServerResult<()> {
        if self.chains_file.is_none() {
            ChainsFile {
                chains: self.chains.clone(),
            }
            .validate()
            .map_err(|e| ServerError::Config {
                message: e.to_string(),
            })?;
        }

        if self.max_body_bytes == 0 {
            return Err(ServerError::Config {
                message: "max_body_bytes must be greater than 0".to_string(),
            });
        }

        let budgets = &self.proxy.budgets;
        for (pool, budget) in [
            ("standard", budgets.standard),
            ("archive", budgets.archive),
            ("mev", budgets.mev),
            ("mev_fallback", budgets.mev_fallback),
        ] {
            if budget == 0 {
                return Err(ServerError::Config {
                    message: format!("proxy.budgets.{pool} must be greater than 0"),
                });
            }
        }

        let burst = self.proxy.burst_multiplier;
        if !burst.is_finite() || burst < 1.0 {
            return Err(ServerError::Config {
                message: format!("proxy.burst_multiplier must be at least 1, got {burst}"),
            });
        }

        self.token_plans().map(|_| ())
    }

    /// Resolve a plan name against custom plans first, then built-in ones
    pub fn plan(&self, name: &str) -> Option<Plan> {
        self.plans
            .iter()
            .find(|plan| plan.name.eq_ignore_ascii_case(name))
            .cloned()
            .or_else(|| name.parse().ok())
    }

    /// Every configured token with its plan
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if a token names an unknown plan.
    pub fn token_plans(&self) -> ServerResult<Vec<(String, Plan)>> {
        self.tokens
            .iter()
            .map(|(token, plan_name)| {
                self.plan(plan_name)
                    .map(|plan| (token.clone(), plan))
                    .ok_or_else(|| ServerError::Config {
                        message: format!("token is bound to unknown plan {plan_name}"),
                    })
            })
            .collect()
    }

    /// Create configuration for testing
    pub fn for_testing() -> Self {
        Self {
            port: ServerPort::testing(),
            timeout_seconds: TimeoutSeconds::testing(),
            environment: Environment::Testing,
            ..Self::default()
        }
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port.value())
    }
}
