//! Application settings and configuration management

use crate::error::{GatewayError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Shared registry file location and stale-entry policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_path")]
    pub path: String,
    /// Records without a liveness signal for this long are removed; 0 disables cleanup
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

fn default_registry_path() -> String {
    "./data/registry.json".to_string()
}

fn default_stale_after() -> u64 {
    300
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
            stale_after_secs: default_stale_after(),
        }
    }
}

impl RegistryConfig {
    pub fn stale_after(&self) -> Option<Duration> {
        (self.stale_after_secs > 0).then(|| Duration::from_secs(self.stale_after_secs))
    }
}

/// Outbound call timeouts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_aggregate_timeout")]
    pub aggregate_timeout_ms: u64,
}

fn default_proxy_timeout() -> u64 {
    10_000
}

fn default_aggregate_timeout() -> u64 {
    5_000
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_proxy_timeout(),
            aggregate_timeout_ms: default_aggregate_timeout(),
        }
    }
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn aggregate_timeout(&self) -> Duration {
        Duration::from_millis(self.aggregate_timeout_ms)
    }
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// How long an open circuit rejects requests before allowing a trial
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown() -> u64 {
    30
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Periodic registry probing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_health_path")]
    pub path: String,
    #[serde(default = "default_health_timeout")]
    pub timeout_ms: u64,
}

fn default_health_interval() -> u64 {
    30
}

fn default_initial_delay() -> u64 {
    5
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_health_timeout() -> u64 {
    5_000
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval(),
            initial_delay_secs: default_initial_delay(),
            path: default_health_path(),
            timeout_ms: default_health_timeout(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst_size: u32,
}

fn default_true() -> bool {
    true
}

fn default_rps() -> u32 {
    100
}

fn default_burst() -> u32 {
    200
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: default_rps(),
            burst_size: default_burst(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// One entry of the public route table, evaluated first-match in declaration order
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Public path prefix, e.g. `/api/items`
    pub prefix: String,
    /// Registry name of the backend serving this prefix
    pub service: String,
    /// Root the backend mounts the resource under, e.g. `/items`
    pub upstream_root: String,
}

impl RouteConfig {
    pub fn new(prefix: &str, service: &str, upstream_root: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            service: service.to_string(),
            upstream_root: upstream_root.to_string(),
        }
    }
}

/// The route table the gateway ships with
pub fn default_routes() -> Vec<RouteConfig> {
    vec![
        RouteConfig::new("/api/auth", "user-service", "/auth"),
        RouteConfig::new("/api/users", "user-service", "/users"),
        RouteConfig::new("/api/search/items", "item-service", "/search/items"),
        RouteConfig::new("/api/items", "item-service", "/items"),
        RouteConfig::new("/api/categories", "item-service", "/categories"),
        RouteConfig::new("/api/lists", "list-service", "/lists"),
    ]
}

fn invalid(message: impl Into<String>) -> GatewayError {
    GatewayError::Config(config::ConfigError::Message(message.into()))
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            // Override with environment variables (prefixed with GATEWAY__)
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0"));
        }

        if self.proxy.timeout_ms == 0 || self.proxy.aggregate_timeout_ms == 0 {
            return Err(invalid("Proxy timeouts must be greater than 0"));
        }

        if self.health_check.timeout_ms == 0 || self.health_check.interval_secs == 0 {
            return Err(invalid("Health check interval and timeout must be greater than 0"));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(invalid("Circuit breaker failure threshold cannot be 0"));
        }

        for route in &self.routes {
            if route.service.is_empty() || route.upstream_root.is_empty() {
                return Err(invalid(format!(
                    "Route '{}' must name a service and an upstream root",
                    route.prefix
                )));
            }
            if !route.prefix.starts_with("/api/") {
                return Err(invalid(format!(
                    "Route prefix '{}' must start with /api/",
                    route.prefix
                )));
            }
            if !route.upstream_root.starts_with('/') || route.upstream_root == "/" {
                return Err(invalid(format!(
                    "Route '{}' has invalid upstream root '{}'",
                    route.prefix, route.upstream_root
                )));
            }
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            registry: RegistryConfig::default(),
            proxy: ProxyConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            health_check: HealthCheckConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
            routes: default_routes(),
        }
    }
}
