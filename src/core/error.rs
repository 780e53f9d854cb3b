//! # Error Handling Module
//!
//! Defines the gateway error taxonomy using the `thiserror` crate and maps each
//! error to the HTTP status code and client-safe message it surfaces as.
//!
//! Two principles apply everywhere:
//! - Clients only ever see a structured JSON body `{"error": <message>}` with a
//!   stable, generic message. Never a stack trace, never upstream exception text.
//! - The full error detail is logged server-side when the error is converted
//!   into a response, so operators can diagnose without leaking internals.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Main result type used throughout the gateway.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// All failure modes a request can hit on its way through the gateway.
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// No configured route prefix matched the request path.
    #[error("no route configured for path: {path}")]
    RouteNotFound { path: String },

    /// Authentication was required and the credential was missing or invalid.
    #[error("authentication failed: {reason}")]
    Authentication { reason: String },

    /// The fixed-window request counter for (client, service) is over the cap.
    #[error("rate limit exceeded: {limit} requests per {window_secs}s window")]
    RateLimitExceeded { limit: u32, window_secs: u64 },

    /// The upstream call did not complete within the configured timeout.
    #[error("upstream timeout for service '{service}' after {timeout_ms}ms")]
    UpstreamTimeout { service: String, timeout_ms: u64 },

    /// The upstream refused the connection or was unreachable.
    #[error("upstream unreachable for service '{service}': {reason}")]
    UpstreamUnreachable { service: String, reason: String },

    /// The upstream answered, but the response could not be relayed
    /// (e.g. a JSON content type with an undecodable body).
    #[error("malformed response from service '{service}': {reason}")]
    UpstreamMalformed { service: String, reason: String },

    /// Invalid or inconsistent gateway configuration.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The shared counter/cache store failed.
    #[error("store error: {message}")]
    Store { message: String },

    /// Any other failure inside the gateway itself.
    #[error("internal gateway error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// Create an authentication error with a custom reason.
    pub fn auth<S: Into<String>>(reason: S) -> Self {
        Self::Authentication {
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a custom message.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a store error with a custom message.
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status code this error surfaces as.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamUnreachable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamMalformed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable message returned to the client. Deliberately generic: the
    /// `Display` form may carry upstream detail and is only ever logged.
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::RouteNotFound { .. } => "Service not found",
            Self::Authentication { .. } => "Authentication required",
            Self::RateLimitExceeded { .. } => "Rate limit exceeded",
            Self::UpstreamTimeout { .. } => "Service timeout",
            Self::UpstreamUnreachable { .. } => "Service unavailable",
            Self::UpstreamMalformed { .. }
            | Self::Configuration { .. }
            | Self::Store { .. }
            | Self::Internal { .. } => "Internal gateway error",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for GatewayError {
    fn from(err: redis::RedisError) -> Self {
        Self::Store {
            message: err.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(status = status.as_u16(), detail = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), detail = %self, "request rejected");
        }

        let body = json!({ "error": self.client_message() });
        (status, Json(body)).into_response()
    }
}
