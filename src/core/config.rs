//! # Configuration Management
//!
//! Everything the gateway needs at runtime is collected into a single
//! [`GatewayConfig`] that is built once at startup and injected by reference
//! into the request pipeline. There are no module-level globals: components
//! receive the sections they care about at construction time.
//!
//! Configuration is layered:
//! 1. Built-in defaults mirroring the standard student-management deployment
//!    (eight services behind `/api/v1/...` prefixes).
//! 2. An optional YAML file (path from `GATEWAY_CONFIG_PATH`).
//! 3. Environment overrides (`SERVICE_ROUTES`, `DEFAULT_TIMEOUT`,
//!    `ENABLE_CACHING`, `ENABLE_RATE_LIMITING`, `ENABLE_AUTH_CHECK`,
//!    `AUTH_MODE`, rate-limit and cache numerics, store selection).
//!
//! `validate()` runs before the server binds so a broken config fails fast
//! instead of surfacing as per-request 500s.

use crate::core::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the gateway binds to.
    pub listen_addr: SocketAddr,

    /// Known upstream services, keyed by service name.
    pub services: HashMap<String, ServiceConfig>,

    /// Ordered route table: path prefix -> service. Longest prefix wins.
    pub routes: Vec<RouteConfig>,

    /// Upstream forwarding settings.
    pub forwarder: ForwarderConfig,

    /// Authentication gate settings.
    pub auth: AuthConfig,

    /// Fixed-window rate limiter settings.
    pub rate_limit: RateLimitConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Shared key-value store backend.
    pub store: StoreConfig,
}

/// A single upstream service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the service, e.g. `http://academic:8001`.
    pub base_url: String,

    /// Health probe path on the service.
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

fn default_health_path() -> String {
    "/health".to_string()
}

impl ServiceConfig {
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            health_path: default_health_path(),
        }
    }

    /// Absolute URL of the service's health endpoint.
    pub fn health_url(&self) -> String {
        join_url(&self.base_url, &self.health_path)
    }
}

/// One entry of the route table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Path prefix this route claims, e.g. `/api/v1/courses/`.
    pub prefix: String,

    /// Name of the owning service (must exist in `services`).
    pub service: String,

    /// Upstream base URL requests are forwarded to. When absent, defaults to
    /// the service base URL joined with the route prefix, which preserves the
    /// full original path on the upstream side.
    #[serde(default)]
    pub upstream: Option<String>,
}

impl RouteConfig {
    pub fn new<S: Into<String>>(prefix: S, service: S) -> Self {
        Self {
            prefix: prefix.into(),
            service: service.into(),
            upstream: None,
        }
    }
}

/// Settings for the upstream forwarder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Upstream call timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Maximum inbound request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_body_size: 16 * 1024 * 1024,
        }
    }
}

/// How the auth gate treats failed or missing credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Missing token, invalid token, or a failed introspection call denies
    /// the request.
    Strict,
    /// The same failures log a warning and allow the request. An explicit
    /// fail-open policy for development environments.
    Permissive,
}

impl FromStr for AuthMode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "permissive" => Ok(Self::Permissive),
            other => Err(GatewayError::config(format!(
                "invalid auth mode '{other}', expected 'strict' or 'permissive'"
            ))),
        }
    }
}

/// Authentication gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Master toggle for the auth gate.
    pub enabled: bool,

    /// Strict (fail closed) or permissive (fail open) handling.
    pub mode: AuthMode,

    /// Paths that never require authentication.
    pub allowlist: Vec<String>,

    /// Service whose token-introspection endpoint validates bearer tokens.
    pub introspection_service: String,

    /// Path of the token-introspection endpoint on that service.
    pub introspection_path: String,

    /// Timeout for the introspection call.
    #[serde(with = "humantime_serde")]
    pub introspection_timeout: Duration,

    /// Service that owns the credential login API.
    pub login_service: String,

    /// Path of the login endpoint on that service.
    pub login_path: String,

    /// Whether the development bypass token is honored at all.
    pub allow_dev_token: bool,

    /// The development bypass token value.
    pub dev_token: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: AuthMode::Strict,
            allowlist: vec![
                "/".to_string(),
                "/health".to_string(),
                "/api/v1/users/login/".to_string(),
                "/api/v1/users/health/".to_string(),
            ],
            introspection_service: "user-management".to_string(),
            introspection_path: "/api/v1/users/validate-token/".to_string(),
            introspection_timeout: Duration::from_secs(10),
            login_service: "user-management".to_string(),
            login_path: "/api/v1/users/login/".to_string(),
            allow_dev_token: false,
            dev_token: "dummy-token-for-development".to_string(),
        }
    }
}

/// Fixed-window rate limiter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,

    /// Requests allowed per window for a (client, service) pair.
    pub max_requests: u32,

    /// Window length.
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Store key prefix for rate counters.
    pub key_prefix: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window: Duration::from_secs(60),
            key_prefix: "rate_limit".to_string(),
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Time-to-live of cached responses. Expiry is the only invalidation.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Paths under this prefix are never cached. The `/api/` convention is
    /// carried over from the original deployment, where such paths are
    /// orchestration calls even when nominally GET.
    pub bypass_prefix: String,

    /// Store key prefix for cached responses.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(300),
            bypass_prefix: "/api/".to_string(),
            key_prefix: "gateway".to_string(),
        }
    }
}

/// Which shared store backs rate counters and the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process map. Correct for a single gateway instance and for tests.
    Memory,
    /// Networked store shared by all gateway instances.
    Redis,
}

impl FromStr for StoreBackend {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(GatewayError::config(format!(
                "invalid store backend '{other}', expected 'memory' or 'redis'"
            ))),
        }
    }
}

/// Shared store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Redis connection URL (used when `backend` is `redis`).
    pub redis_url: String,

    /// Prefix applied to every store key.
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "campus-gateway:".to_string(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let services = HashMap::from([
            (
                "user-management".to_string(),
                ServiceConfig {
                    base_url: "http://user-management:8000".to_string(),
                    health_path: "/api/v1/users/health/".to_string(),
                },
            ),
            (
                "academic".to_string(),
                ServiceConfig::new("http://academic:8001"),
            ),
            (
                "attendance".to_string(),
                ServiceConfig::new("http://attendance:8002"),
            ),
            (
                "notification".to_string(),
                ServiceConfig::new("http://notification:8003"),
            ),
            (
                "leave-management".to_string(),
                ServiceConfig::new("http://leave-management:8004"),
            ),
            (
                "feedback".to_string(),
                ServiceConfig::new("http://feedback:8005"),
            ),
            (
                "assessment".to_string(),
                ServiceConfig::new("http://assessment:8006"),
            ),
            (
                "financial".to_string(),
                ServiceConfig::new("http://financial:8007"),
            ),
        ]);

        let routes = vec![
            RouteConfig::new("/api/v1/users/", "user-management"),
            RouteConfig::new("/api/v1/auth/", "user-management"),
            RouteConfig::new("/api/v1/academics/", "academic"),
            RouteConfig::new("/api/v1/courses/", "academic"),
            RouteConfig::new("/api/v1/subjects/", "academic"),
            RouteConfig::new("/api/v1/sessions/", "academic"),
            RouteConfig::new("/api/v1/attendance/", "attendance"),
            RouteConfig::new("/api/v1/notifications/", "notification"),
            RouteConfig::new("/api/v1/leaves/", "leave-management"),
            RouteConfig::new("/api/v1/leave/", "leave-management"),
            RouteConfig::new("/api/v1/feedback/", "feedback"),
            RouteConfig::new("/api/v1/assessments/", "assessment"),
            RouteConfig::new("/api/v1/assignments/", "assessment"),
            RouteConfig::new("/api/v1/submissions/", "assessment"),
            RouteConfig::new("/api/v1/exams/", "assessment"),
            RouteConfig::new("/api/v1/grades/", "assessment"),
            RouteConfig::new("/api/v1/results/", "assessment"),
            RouteConfig::new("/api/v1/finances/", "financial"),
            RouteConfig::new("/api/v1/fines/", "financial"),
            RouteConfig::new("/api/v1/payments/", "financial"),
        ];

        Self {
            listen_addr: "0.0.0.0:8080".parse().expect("valid default addr"),
            services,
            routes,
            forwarder: ForwarderConfig::default(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration: defaults, then the optional YAML file named by
    /// `GATEWAY_CONFIG_PATH`, then environment overrides. Validated before
    /// being returned.
    pub fn load() -> GatewayResult<Self> {
        let mut config = match std::env::var("GATEWAY_CONFIG_PATH") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides_from(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML configuration file. Missing sections fall back to defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GatewayError::config(format!(
                "cannot read config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let config: Self = serde_yaml::from_str(&raw)?;
        Ok(config)
    }

    /// Apply scalar overrides from an environment-like lookup. Split out from
    /// `load()` so tests can drive it without touching process globals.
    pub fn apply_overrides_from<F>(&mut self, get: F) -> GatewayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = get("GATEWAY_LISTEN_ADDR") {
            self.listen_addr = raw
                .parse()
                .map_err(|e| GatewayError::config(format!("invalid GATEWAY_LISTEN_ADDR: {e}")))?;
        }
        if let Some(raw) = get("SERVICE_ROUTES") {
            let urls: HashMap<String, String> = serde_json::from_str(&raw).map_err(|e| {
                GatewayError::config(format!("SERVICE_ROUTES is not a JSON object: {e}"))
            })?;
            for (name, base_url) in urls {
                self.services
                    .entry(name)
                    .and_modify(|svc| svc.base_url = base_url.clone())
                    .or_insert_with(|| ServiceConfig::new(base_url));
            }
        }
        if let Some(raw) = get("DEFAULT_TIMEOUT") {
            self.forwarder.timeout = Duration::from_secs(parse_number(&raw, "DEFAULT_TIMEOUT")?);
        }
        if let Some(raw) = get("ENABLE_CACHING") {
            self.cache.enabled = parse_bool(&raw, "ENABLE_CACHING")?;
        }
        if let Some(raw) = get("ENABLE_RATE_LIMITING") {
            self.rate_limit.enabled = parse_bool(&raw, "ENABLE_RATE_LIMITING")?;
        }
        if let Some(raw) = get("ENABLE_AUTH_CHECK") {
            self.auth.enabled = parse_bool(&raw, "ENABLE_AUTH_CHECK")?;
        }
        if let Some(raw) = get("AUTH_MODE") {
            self.auth.mode = raw.parse()?;
        }
        if let Some(raw) = get("GATEWAY_ALLOW_DEV_TOKEN") {
            self.auth.allow_dev_token = parse_bool(&raw, "GATEWAY_ALLOW_DEV_TOKEN")?;
        }
        if let Some(raw) = get("RATE_LIMIT_MAX_REQUESTS") {
            self.rate_limit.max_requests =
                parse_number::<u32>(&raw, "RATE_LIMIT_MAX_REQUESTS")?;
        }
        if let Some(raw) = get("RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window =
                Duration::from_secs(parse_number(&raw, "RATE_LIMIT_WINDOW_SECS")?);
        }
        if let Some(raw) = get("CACHE_TTL_SECS") {
            self.cache.ttl = Duration::from_secs(parse_number(&raw, "CACHE_TTL_SECS")?);
        }
        if let Some(raw) = get("GATEWAY_STORE_BACKEND") {
            self.store.backend = raw.parse()?;
        }
        if let Some(raw) = get("REDIS_URL") {
            self.store.redis_url = raw;
        }
        Ok(())
    }

    /// Reject inconsistent configuration before the server starts.
    pub fn validate(&self) -> GatewayResult<()> {
        for (name, svc) in &self.services {
            let url = Url::parse(&svc.base_url).map_err(|e| {
                GatewayError::config(format!("service '{name}' has invalid base_url: {e}"))
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(GatewayError::config(format!(
                    "service '{name}' base_url must be http(s), got '{}'",
                    url.scheme()
                )));
            }
        }

        for route in &self.routes {
            if !route.prefix.starts_with('/') {
                return Err(GatewayError::config(format!(
                    "route prefix '{}' must start with '/'",
                    route.prefix
                )));
            }
            if !self.services.contains_key(&route.service) {
                return Err(GatewayError::config(format!(
                    "route '{}' references unknown service '{}'",
                    route.prefix, route.service
                )));
            }
            if let Some(upstream) = &route.upstream {
                Url::parse(upstream).map_err(|e| {
                    GatewayError::config(format!(
                        "route '{}' has invalid upstream URL: {e}",
                        route.prefix
                    ))
                })?;
            }
        }

        if self.rate_limit.enabled {
            if self.rate_limit.max_requests == 0 {
                return Err(GatewayError::config(
                    "rate_limit.max_requests must be at least 1",
                ));
            }
            if self.rate_limit.window.is_zero() {
                return Err(GatewayError::config("rate_limit.window must be non-zero"));
            }
        }

        if self.cache.enabled && self.cache.ttl.is_zero() {
            return Err(GatewayError::config("cache.ttl must be non-zero"));
        }

        // The login route is registered whether or not the gate is enabled.
        if !self.auth.login_path.starts_with('/') {
            return Err(GatewayError::config(format!(
                "auth.login_path '{}' must start with '/'",
                self.auth.login_path
            )));
        }

        if self.auth.enabled {
            for (role, service) in [
                ("introspection_service", &self.auth.introspection_service),
                ("login_service", &self.auth.login_service),
            ] {
                if !self.services.contains_key(service) {
                    return Err(GatewayError::config(format!(
                        "auth.{role} '{service}' is not a configured service"
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Join a base URL and a path without doubling or dropping the slash.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

fn parse_bool(raw: &str, name: &str) -> GatewayResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(GatewayError::config(format!(
            "invalid boolean '{other}' for {name}"
        ))),
    }
}

fn parse_number<T: FromStr>(raw: &str, name: &str) -> GatewayResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| GatewayError::config(format!("invalid value '{raw}' for {name}: {e}")))
}
