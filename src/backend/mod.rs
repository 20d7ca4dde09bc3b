//! Backend module - outbound transport to registered services

pub mod http_backend;
pub mod traits;

pub use http_backend::HttpUpstream;
pub use traits::{UpstreamClient, UpstreamFailure, UpstreamRequest, UpstreamResponse};
