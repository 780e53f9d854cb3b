//! # Route Table
//!
//! A static mapping from URL path prefixes to upstream services, built once at
//! startup from configuration and shared immutably across request handlers.
//! Lookup is longest-prefix-wins over an ordered list; there is no dynamic
//! registration and no health-aware routing. A dead upstream is only
//! discovered when the forwarder fails.

use crate::core::config::{join_url, GatewayConfig};
use crate::core::error::{GatewayError, GatewayResult};

/// A compiled route table entry.
#[derive(Debug, Clone)]
struct Route {
    /// Normalized prefix: leading slash, no trailing slash.
    prefix: String,
    /// Owning service name, used for rate-limit keys and logging.
    service: String,
    /// Upstream base URL the remainder is appended to. No trailing slash.
    upstream_base: String,
}

/// Result of a successful route lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    /// Name of the service handling this path.
    pub service: String,
    /// Upstream base URL.
    pub upstream_base: String,
    /// Path remainder after the matched prefix, with its leading slash.
    /// The forwarded URL is `upstream_base + remainder`.
    pub remainder: String,
}

/// Immutable prefix-based route table.
#[derive(Debug)]
pub struct RouteTable {
    /// Sorted by descending prefix length so the first match is the longest.
    routes: Vec<Route>,
}

impl RouteTable {
    /// Compile the route table from configuration.
    ///
    /// When a route has no explicit upstream URL, the upstream defaults to the
    /// service base URL joined with the route prefix, so upstreams observe the
    /// same path the client sent.
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let mut routes = Vec::with_capacity(config.routes.len());

        for route in &config.routes {
            let service = config.services.get(&route.service).ok_or_else(|| {
                GatewayError::config(format!(
                    "route '{}' references unknown service '{}'",
                    route.prefix, route.service
                ))
            })?;

            let prefix = normalize_prefix(&route.prefix);
            let upstream_base = match &route.upstream {
                Some(upstream) => upstream.trim_end_matches('/').to_string(),
                None => join_url(&service.base_url, &prefix)
                    .trim_end_matches('/')
                    .to_string(),
            };

            routes.push(Route {
                prefix,
                service: route.service.clone(),
                upstream_base,
            });
        }

        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        Ok(Self { routes })
    }

    /// Resolve a request path to its upstream, or `None` when no configured
    /// prefix matches.
    pub fn resolve(&self, path: &str) -> Option<ResolvedRoute> {
        for route in &self.routes {
            if let Some(remainder) = match_prefix(path, &route.prefix) {
                return Some(ResolvedRoute {
                    service: route.service.clone(),
                    upstream_base: route.upstream_base.clone(),
                    remainder,
                });
            }
        }
        None
    }

    /// Number of compiled routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Strip trailing slashes, keep the leading one.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Match `path` against a normalized prefix at a path-segment boundary.
/// Returns the remainder (with leading slash) on a match.
fn match_prefix(path: &str, prefix: &str) -> Option<String> {
    if prefix == "/" {
        return Some(path.to_string());
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        // "/api/v1/users" must not match "/api/v1/userstats".
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{RouteConfig, ServiceConfig};

    fn test_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.services.clear();
        config.routes.clear();
        config.services.insert(
            "academic".to_string(),
            ServiceConfig::new("http://svc:9001"),
        );
        config.services.insert(
            "user-management".to_string(),
            ServiceConfig::new("http://users:8000"),
        );
        config
    }

    #[test]
    fn test_resolve_with_explicit_upstream() {
        let mut config = test_config();
        config.routes.push(RouteConfig {
            prefix: "/academic".to_string(),
            service: "academic".to_string(),
            upstream: Some("http://svc:9001".to_string()),
        });
        let table = RouteTable::from_config(&config).unwrap();

        let resolved = table.resolve("/academic/courses/5").unwrap();
        assert_eq!(resolved.service, "academic");
        assert_eq!(resolved.upstream_base, "http://svc:9001");
        assert_eq!(resolved.remainder, "/courses/5");
    }

    #[test]
    fn test_default_upstream_preserves_full_path() {
        let mut config = test_config();
        config
            .routes
            .push(RouteConfig::new("/api/v1/users/", "user-management"));
        let table = RouteTable::from_config(&config).unwrap();

        let resolved = table.resolve("/api/v1/users/profile/3/").unwrap();
        assert_eq!(resolved.upstream_base, "http://users:8000/api/v1/users");
        assert_eq!(resolved.remainder, "/profile/3/");
        // upstream_base + remainder reproduces the original path.
        assert_eq!(
            format!("{}{}", resolved.upstream_base, resolved.remainder),
            "http://users:8000/api/v1/users/profile/3/"
        );
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut config = test_config();
        config.routes.push(RouteConfig {
            prefix: "/api".to_string(),
            service: "academic".to_string(),
            upstream: Some("http://svc:9001/catchall".to_string()),
        });
        config.routes.push(RouteConfig {
            prefix: "/api/v1/users".to_string(),
            service: "user-management".to_string(),
            upstream: Some("http://users:8000/api/v1/users".to_string()),
        });
        let table = RouteTable::from_config(&config).unwrap();

        assert_eq!(
            table.resolve("/api/v1/users/1").unwrap().service,
            "user-management"
        );
        assert_eq!(table.resolve("/api/v2/other").unwrap().service, "academic");
    }

    #[test]
    fn test_unmatched_path_is_none() {
        let mut config = test_config();
        config.routes.push(RouteConfig {
            prefix: "/academic".to_string(),
            service: "academic".to_string(),
            upstream: None,
        });
        let table = RouteTable::from_config(&config).unwrap();

        assert!(table.resolve("/unknown/path").is_none());
        // Prefix must end at a segment boundary.
        assert!(table.resolve("/academics/courses").is_none());
    }

    #[test]
    fn test_exact_prefix_match_has_root_remainder() {
        let mut config = test_config();
        config.routes.push(RouteConfig {
            prefix: "/academic/".to_string(),
            service: "academic".to_string(),
            upstream: Some("http://svc:9001".to_string()),
        });
        let table = RouteTable::from_config(&config).unwrap();

        let resolved = table.resolve("/academic").unwrap();
        assert_eq!(resolved.remainder, "/");
    }
}
