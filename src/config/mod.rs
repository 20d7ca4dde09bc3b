//! Configuration module

pub mod settings;

pub use settings::{
    default_routes, CircuitBreakerConfig, HealthCheckConfig, LoggingConfig, ProxyConfig,
    RateLimitConfig, RegistryConfig, RouteConfig, ServerConfig, Settings,
};
