//! The route table — one compiled prefix → routing-key mapping, the single
//! point of routing policy for the whole gateway.
//!
//! Matching is longest-prefix-wins on path segments: `/api/auth` matches
//! `/api/auth` and `/api/auth/login` but never `/api/authors`. Unknown
//! prefixes resolve to nothing and surface as 404; missing mappings are
//! never guessed.

use crate::config::RouteConfig;

#[derive(Debug, Clone)]
pub struct CompiledRoute {
    pub prefix: String,
    pub routing_key: String,
}

pub struct RouteTable {
    /// Sorted by descending prefix length so the first match is the longest.
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Compile the table once at startup.
    pub fn new(configs: &[RouteConfig]) -> Self {
        let mut routes: Vec<CompiledRoute> = configs
            .iter()
            .map(|c| CompiledRoute {
                prefix: c.prefix.trim_end_matches('/').to_string(),
                routing_key: c.routing_key.clone(),
            })
            .collect();
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        for route in &routes {
            tracing::debug!(
                "routing: compiled route entry, prefix={}, routing_key={}",
                route.prefix,
                route.routing_key,
            );
        }
        tracing::info!("routing: compiled route table, count={}", routes.len());

        Self { routes }
    }

    /// Resolve a request path to its routing key.
    pub fn resolve(&self, path: &str) -> Option<&CompiledRoute> {
        self.routes.iter().find(|r| prefix_matches(&r.prefix, path))
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

/// Segment-aware prefix test: the prefix must be followed by end-of-path or
/// a `/` boundary.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
