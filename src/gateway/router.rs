//! Table-driven mapping from public paths to backend services

use tracing::debug;

use crate::config::{default_routes, RouteConfig};

/// A resolved forwarding target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub service: String,
    /// Path on the backend, never empty and never bare `/`
    pub upstream_path: String,
}

/// Ordered list of route rules, evaluated first-match
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<RouteConfig>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(default_routes())
    }
}

impl RouteTable {
    /// Create a route table; prefixes and roots are normalized without a trailing slash
    pub fn new(routes: Vec<RouteConfig>) -> Self {
        let routes = routes
            .into_iter()
            .map(|route| RouteConfig {
                prefix: trim_trailing_slash(&route.prefix).to_string(),
                upstream_root: trim_trailing_slash(&route.upstream_root).to_string(),
                service: route.service,
            })
            .collect();
        Self { routes }
    }

    /// Resolve a public path to its backend and rewritten path
    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        let route = self
            .routes
            .iter()
            .find(|route| matches_prefix(path, &route.prefix))?;

        let remainder = &path[route.prefix.len()..];
        let upstream_path = if remainder.is_empty() || remainder == "/" {
            // A bare collection root maps to the backend's collection, not to `/`
            route.upstream_root.clone()
        } else {
            format!("{}{}", route.upstream_root, remainder)
        };

        debug!(
            path = %path,
            service = %route.service,
            upstream_path = %upstream_path,
            "Resolved route"
        );

        Some(RouteMatch {
            service: route.service.clone(),
            upstream_path,
        })
    }

    /// Public prefixes, in evaluation order
    pub fn prefixes(&self) -> Vec<String> {
        self.routes.iter().map(|r| r.prefix.clone()).collect()
    }

    /// Distinct service names referenced by the table
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.routes.iter().map(|r| r.service.clone()).collect();
        services.sort();
        services.dedup();
        services
    }
}

/// Prefix match on a path-segment boundary
fn matches_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn trim_trailing_slash(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}
