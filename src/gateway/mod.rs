//! Gateway module - circuit breaking, routing, proxying, aggregation and health checking

pub mod aggregator;
pub mod circuit_breaker;
pub mod health_check;
pub mod proxy;
pub mod router;
