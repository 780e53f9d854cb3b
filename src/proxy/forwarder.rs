//! # Forwarder
//!
//! Builds the upstream request from the inbound one (method, filtered headers,
//! body, query string), issues it with the configured timeout, and translates
//! the result for relaying:
//!
//! - JSON responses are decoded and re-encoded as the gateway's JSON response
//!   with the upstream's status code.
//! - Everything else is relayed byte-for-byte with the upstream content type,
//!   for success and error statuses alike. This matters for file and PDF
//!   downloads proxied through the gateway.
//! - Failures map onto the gateway taxonomy: timeout -> 504, connection
//!   refused/unreachable -> 503, anything else -> 500 with the cause logged.
//!
//! Hop-by-hop headers are stripped in both directions: `Host`,
//! `Content-Length`, `Transfer-Encoding` and `Connection` are not forwarded
//! upstream, and `Content-Length`, `Content-Encoding`, `Transfer-Encoding`
//! and `Connection` are not relayed back (the gateway's own transport sets
//! them). Cookies travel in the forwarded `Cookie` header like any other
//! end-to-end header.
//!
//! If the client disconnects mid-forward, axum drops the handler future and
//! the in-flight upstream call is aborted with it.

use crate::core::config::ForwarderConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::routing::ResolvedRoute;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use std::time::Duration;

/// Request headers never forwarded upstream.
const STRIPPED_REQUEST_HEADERS: [&str; 4] =
    ["host", "content-length", "transfer-encoding", "connection"];

/// Response headers never relayed back to the client.
const STRIPPED_RESPONSE_HEADERS: [&str; 4] = [
    "content-length",
    "content-encoding",
    "transfer-encoding",
    "connection",
];

/// Decoded upstream response body.
#[derive(Debug)]
pub enum UpstreamBody {
    /// `Content-Type` indicated JSON; the payload was decoded and will be
    /// re-encoded by the gateway.
    Json(serde_json::Value),
    /// Anything else: relayed verbatim with the upstream content type.
    Raw {
        content_type: Option<HeaderValue>,
        bytes: Bytes,
    },
}

/// What came back from the upstream, ready to relay.
#[derive(Debug)]
pub struct UpstreamReply {
    pub status: StatusCode,
    /// Upstream headers minus hop-by-hop ones. Relayed on the raw path only;
    /// the JSON path re-encodes and emits a fresh content type.
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

impl UpstreamReply {
    /// Borrow the JSON payload, if this reply carries one.
    pub fn json(&self) -> Option<&serde_json::Value> {
        match &self.body {
            UpstreamBody::Json(value) => Some(value),
            UpstreamBody::Raw { .. } => None,
        }
    }
}

/// Issues upstream calls on behalf of the pipeline.
pub struct Forwarder {
    client: reqwest::Client,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(config: &ForwarderConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    /// Forward one request to its resolved upstream.
    pub async fn forward(
        &self,
        route: &ResolvedRoute,
        method: &Method,
        headers: &HeaderMap,
        query: Option<&str>,
        body: Bytes,
    ) -> GatewayResult<UpstreamReply> {
        let url = build_upstream_url(route, query);

        let upstream_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
            .map_err(|e| GatewayError::internal(format!("invalid method: {e}")))?;

        let mut request = self
            .client
            .request(upstream_method, &url)
            .headers(filter_request_headers(headers));
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.classify(&route.service, e))?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| GatewayError::internal(format!("invalid upstream status: {e}")))?;
        let (headers, content_type) = filter_response_headers(response.headers());

        let is_json = content_type
            .as_ref()
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains("application/json"))
            .unwrap_or(false);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.classify(&route.service, e))?;

        let body = if is_json {
            let value = if bytes.is_empty() {
                serde_json::Value::Object(serde_json::Map::new())
            } else {
                serde_json::from_slice(&bytes).map_err(|e| GatewayError::UpstreamMalformed {
                    service: route.service.clone(),
                    reason: format!("declared JSON but failed to decode: {e}"),
                })?
            };
            UpstreamBody::Json(value)
        } else {
            UpstreamBody::Raw {
                content_type,
                bytes,
            }
        };

        Ok(UpstreamReply {
            status,
            headers,
            body,
        })
    }

    /// Map a transport failure onto the gateway taxonomy.
    fn classify(&self, service: &str, error: reqwest::Error) -> GatewayError {
        if error.is_timeout() {
            GatewayError::UpstreamTimeout {
                service: service.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else if error.is_connect() {
            GatewayError::UpstreamUnreachable {
                service: service.to_string(),
                reason: error.to_string(),
            }
        } else {
            GatewayError::internal(format!("forwarding to '{service}' failed: {error}"))
        }
    }
}

/// Upstream URL: base + remainder, preserving the raw query string.
fn build_upstream_url(route: &ResolvedRoute, query: Option<&str>) -> String {
    let mut url = format!("{}{}", route.upstream_base, route.remainder);
    if let Some(query) = query {
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }
    }
    url
}

/// Copy end-to-end request headers into the upstream client's header map.
fn filter_request_headers(headers: &HeaderMap) -> reqwest::header::HeaderMap {
    let mut forwarded = reqwest::header::HeaderMap::new();
    for (name, value) in headers {
        if STRIPPED_REQUEST_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            forwarded.append(name, value);
        }
    }
    forwarded
}

/// Copy end-to-end response headers back, noting the content type.
fn filter_response_headers(
    headers: &reqwest::header::HeaderMap,
) -> (HeaderMap, Option<HeaderValue>) {
    let mut relayed = HeaderMap::new();
    let mut content_type = None;
    for (name, value) in headers {
        if STRIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            if name == axum::http::header::CONTENT_TYPE {
                content_type = Some(value.clone());
            }
            relayed.append(name, value);
        }
    }
    (relayed, content_type)
}
