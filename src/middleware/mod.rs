//! Middleware module - request ids and rate limiting

pub mod rate_limit;
pub mod request_id;

pub use rate_limit::RateLimitLayer;
pub use request_id::{RequestIdLayer, REQUEST_ID_HEADER};
