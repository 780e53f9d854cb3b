//! # Authentication Gate
//!
//! Decides whether a request may proceed before anything is forwarded. The
//! gateway never parses or stores tokens: a bearer token is opaque, and the
//! only operation on it is presenting it to the user-management service's
//! token-introspection endpoint and interpreting the status of that call.
//!
//! Failure handling is an explicit, startup-selected mode, never an implicit
//! fallback buried in an error handler:
//! - `AuthMode::Strict` denies on a missing token, a non-200 introspection
//!   response, or an introspection transport failure.
//! - `AuthMode::Permissive` logs a warning and allows on the same conditions.
//!   This fail-open policy exists for development environments and is a
//!   security-relevant difference, which is why it is a named mode.
//!
//! The development bypass token is likewise gated behind the
//! `allow_dev_token` flag rather than an unconditional string comparison.
//!
//! Login is just another HTTP call: credentials are an opaque JSON body
//! forwarded to the user-management login API, and its response is relayed.
//! (The system this replaces authenticated by shelling into the
//! user-management container and scraping stdout; that mechanism is gone.)

use crate::core::config::{join_url, AuthConfig, AuthMode, ServiceConfig};
use crate::core::error::{GatewayError, GatewayResult};
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// The authentication gate and direct-login client.
pub struct AuthGate {
    client: reqwest::Client,
    enabled: bool,
    mode: AuthMode,
    allowlist: Vec<String>,
    introspection_url: String,
    login_url: String,
    allow_dev_token: bool,
    dev_token: String,
}

impl AuthGate {
    /// Build the gate, resolving introspection and login URLs from the
    /// service map.
    pub fn new(
        config: &AuthConfig,
        services: &HashMap<String, ServiceConfig>,
    ) -> GatewayResult<Self> {
        let resolve = |service_name: &str, path: &str| -> GatewayResult<String> {
            let service = services.get(service_name).ok_or_else(|| {
                GatewayError::config(format!("auth references unknown service '{service_name}'"))
            })?;
            Ok(join_url(&service.base_url, path))
        };

        // A disabled gate tolerates a missing auth service so minimal
        // configurations still build; an enabled one does not.
        let lenient = |result: GatewayResult<String>| -> GatewayResult<String> {
            match result {
                Ok(url) => Ok(url),
                Err(_) if !config.enabled => Ok(String::new()),
                Err(e) => Err(e),
            }
        };
        let introspection_url =
            lenient(resolve(&config.introspection_service, &config.introspection_path))?;
        let login_url = lenient(resolve(&config.login_service, &config.login_path))?;

        let client = reqwest::Client::builder()
            .timeout(config.introspection_timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build auth client: {e}")))?;

        Ok(Self {
            client,
            enabled: config.enabled,
            mode: config.mode,
            allowlist: config.allowlist.clone(),
            introspection_url,
            login_url,
            allow_dev_token: config.allow_dev_token,
            dev_token: config.dev_token.clone(),
        })
    }

    /// Paths on the allowlist never require a credential.
    pub fn is_allowlisted(&self, path: &str) -> bool {
        self.allowlist.iter().any(|allowed| allowed == path)
    }

    /// Allow or deny this request. Terminal for the request on deny: the
    /// pipeline never forwards anything the gate rejected.
    pub async fn authorize(&self, path: &str, headers: &HeaderMap) -> GatewayResult<()> {
        if !self.enabled || self.is_allowlisted(path) {
            return Ok(());
        }

        let token = match bearer_token(headers) {
            Some(token) => token,
            None => return self.deny_or_allow(path, "no bearer token provided"),
        };

        if self.allow_dev_token && token == self.dev_token {
            debug!(path, "development bypass token accepted");
            return Ok(());
        }

        match self
            .client
            .get(&self.introspection_url)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => self.deny_or_allow(
                path,
                &format!("token introspection returned {}", response.status()),
            ),
            Err(e) => self.deny_or_allow(path, &format!("token introspection failed: {e}")),
        }
    }

    /// Apply the configured failure mode to a failed check.
    fn deny_or_allow(&self, path: &str, reason: &str) -> GatewayResult<()> {
        match self.mode {
            AuthMode::Strict => Err(GatewayError::auth(reason)),
            AuthMode::Permissive => {
                warn!(path, reason, "auth check failed, allowing (permissive mode)");
                Ok(())
            }
        }
    }

    /// Direct login: validate the credential envelope, forward it to the
    /// user-management login API as an opaque JSON body, and relay the
    /// response status and payload.
    pub async fn login(&self, body: Bytes) -> GatewayResult<(StatusCode, serde_json::Value)> {
        let request: LoginRequest = match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(_) => {
                return Ok((
                    StatusCode::BAD_REQUEST,
                    json!({"error": "Invalid JSON data"}),
                ))
            }
        };

        if request.username.is_empty() || request.password.is_empty() {
            return Ok((
                StatusCode::BAD_REQUEST,
                json!({"error": "Username and password required"}),
            ));
        }

        let response = self
            .client
            .post(&self.login_url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| GatewayError::internal(format!("login upstream call failed: {e}")))?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| GatewayError::internal(format!("invalid login status: {e}")))?;
        let payload: serde_json::Value = response.json().await.map_err(|e| {
            GatewayError::internal(format!("login upstream returned non-JSON body: {e}"))
        })?;

        Ok((status, payload))
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::GatewayConfig;
    use std::time::Duration;

    fn gate_with(mode: AuthMode, allow_dev_token: bool) -> AuthGate {
        let config = GatewayConfig::default();
        let auth = AuthConfig {
            mode,
            allow_dev_token,
            introspection_timeout: Duration::from_millis(200),
            ..AuthConfig::default()
        };
        AuthGate::new(&auth, &config.services).unwrap()
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("Bearer {token}").parse().unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(&bearer("abc123")), Some("abc123"));
        assert_eq!(bearer_token(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Basic dXNlcjpwYXNz".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_allowlist() {
        let gate = gate_with(AuthMode::Strict, false);
        assert!(gate.is_allowlisted("/health"));
        assert!(gate.is_allowlisted("/api/v1/users/login/"));
        assert!(!gate.is_allowlisted("/api/v1/courses/"));
        // Exact match only, not prefix match.
        assert!(!gate.is_allowlisted("/health/deep"));
    }

    #[tokio::test]
    async fn test_allowlisted_path_needs_no_token() {
        let gate = gate_with(AuthMode::Strict, false);
        gate.authorize("/health", &HeaderMap::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_strict_mode_denies_missing_token() {
        let gate = gate_with(AuthMode::Strict, false);
        let err = gate
            .authorize("/api/v1/courses/", &HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Authentication { .. }));
    }

    #[tokio::test]
    async fn test_permissive_mode_allows_missing_token() {
        let gate = gate_with(AuthMode::Permissive, false);
        gate.authorize("/api/v1/courses/", &HeaderMap::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dev_token_honored_only_when_enabled() {
        // Flag on: the dev token short-circuits introspection entirely.
        let gate = gate_with(AuthMode::Strict, true);
        gate.authorize(
            "/api/v1/courses/",
            &bearer("dummy-token-for-development"),
        )
        .await
        .unwrap();

        // Flag off: the same token goes to introspection, which is
        // unreachable here, and strict mode denies.
        let gate = gate_with(AuthMode::Strict, false);
        let err = gate
            .authorize(
                "/api/v1/courses/",
                &bearer("dummy-token-for-development"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Authentication { .. }));
    }

    #[tokio::test]
    async fn test_permissive_mode_fails_open_on_introspection_error() {
        // user-management resolves to a non-routable host, so the
        // introspection call errors; permissive mode still allows.
        let gate = gate_with(AuthMode::Permissive, false);
        gate.authorize("/api/v1/courses/", &bearer("some-token"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_disabled_gate_allows_everything() {
        let config = GatewayConfig::default();
        let auth = AuthConfig {
            enabled: false,
            ..AuthConfig::default()
        };
        let gate = AuthGate::new(&auth, &config.services).unwrap();
        gate.authorize("/api/v1/courses/", &HeaderMap::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_login_rejects_bad_envelope() {
        let gate = gate_with(AuthMode::Strict, false);

        let (status, body) = gate.login(Bytes::from_static(b"not json")).await.unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid JSON data");

        let (status, body) = gate
            .login(Bytes::from_static(br#"{"username": "x"}"#))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Username and password required");
    }
}
