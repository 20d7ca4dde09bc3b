//! HTTP API - router and handlers

pub mod handlers;
pub mod routes;
