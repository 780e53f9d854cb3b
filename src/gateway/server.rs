//! # HTTP Server Module
//!
//! Axum server exposing the gateway surface:
//!
//! - `GET /` - gateway identity and service directory
//! - `GET /health` - gateway self-health
//! - `GET /api/v1/services/status` - auth-gated upstream health summary
//! - `POST <login path>` - direct login relayed to user management
//! - everything else - the proxy pipeline
//!
//! The pipeline order is fixed and each stage can short-circuit the rest:
//! route resolution, then the auth gate, then the rate limiter, then the
//! response cache, and only then the forwarder. Reordering would change
//! observable behavior (e.g. rate-counting unauthenticated requests), so the
//! sequence lives in exactly one place: `proxy_handler`.
//!
//! Requests are handled independently and concurrently; the only shared
//! mutable state is behind the `SharedStore`.

use crate::auth::AuthGate;
use crate::caching::ResponseCache;
use crate::core::config::GatewayConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::middleware::{client_identity, RateLimiter};
use crate::observability::{ServiceHealthChecker, ServiceStatusReport};
use crate::proxy::{Forwarder, UpstreamBody};
use crate::routing::RouteTable;
use crate::store::build_store;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const SERVICES_STATUS_PATH: &str = "/api/v1/services/status";

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub routes: Arc<RouteTable>,
    pub auth: Arc<AuthGate>,
    pub rate_limiter: Arc<RateLimiter>,
    pub cache: Arc<ResponseCache>,
    pub forwarder: Arc<Forwarder>,
    pub health: Arc<ServiceHealthChecker>,
}

/// The assembled gateway server.
pub struct GatewayServer {
    state: AppState,
}

impl GatewayServer {
    /// Validate the configuration and wire up all components.
    pub async fn new(config: GatewayConfig) -> GatewayResult<Self> {
        config.validate()?;

        let store = build_store(&config.store).await?;
        let routes = Arc::new(RouteTable::from_config(&config)?);
        let auth = Arc::new(AuthGate::new(&config.auth, &config.services)?);
        let rate_limiter = Arc::new(RateLimiter::new(store.clone(), &config.rate_limit));
        let cache = Arc::new(ResponseCache::new(store, &config.cache));
        let forwarder = Arc::new(Forwarder::new(&config.forwarder)?);
        let health = Arc::new(ServiceHealthChecker::new(&config.services));

        Ok(Self {
            state: AppState {
                config: Arc::new(config),
                routes,
                auth,
                rate_limiter,
                cache,
                forwarder,
                health,
            },
        })
    }

    /// Build the axum application.
    pub fn app(&self) -> Router {
        let login_path = self.state.config.auth.login_path.clone();
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route(SERVICES_STATUS_PATH, get(services_status_handler))
            .route(&login_path, post(login_handler))
            .fallback(proxy_handler)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until ctrl-c.
    pub async fn serve(self) -> GatewayResult<()> {
        let addr = self.state.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, routes = self.state.routes.len(), "campus-gateway listening");
        self.serve_on(listener, shutdown_signal()).await
    }

    /// Serve on an existing listener with a caller-supplied shutdown future.
    /// Tests use this with an ephemeral port and a pending future.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> GatewayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self
            .app()
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GatewayError::internal(format!("server error: {e}")))?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}

/// Gateway identity, service directory and endpoint map.
async fn root_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut available_services: Vec<&String> = state.config.services.keys().collect();
    available_services.sort();

    let routes: HashMap<&str, &str> = state
        .config
        .routes
        .iter()
        .map(|route| (route.prefix.as_str(), route.service.as_str()))
        .collect();

    Json(json!({
        "service": "API Gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "timestamp": Utc::now().to_rfc3339(),
        "available_services": available_services,
        "endpoints": {
            "health": "/health",
            "services_status": SERVICES_STATUS_PATH,
            "login": state.config.auth.login_path,
        },
        "routes": routes,
    }))
}

/// Gateway self-health.
async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "api-gateway",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Auth-gated health summary of every configured upstream.
async fn services_status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<HashMap<String, ServiceStatusReport>>, GatewayError> {
    state.auth.authorize(SERVICES_STATUS_PATH, &headers).await?;
    Ok(Json(state.health.check_all().await))
}

/// Direct login: relay credentials to the user-management login API.
async fn login_handler(
    State(state): State<AppState>,
    body: bytes::Bytes,
) -> Result<Response, GatewayError> {
    let (status, payload) = state.auth.login(body).await?;
    info!(status = status.as_u16(), "login request completed");
    Ok((status, Json(payload)).into_response())
}

/// The proxy pipeline: route, auth, rate limit, cache, forward.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Result<Response, GatewayError> {
    let (parts, body) = request.into_parts();
    let method = parts.method;
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().map(str::to_string);
    let headers = parts.headers;

    // 1. Route resolution. Unmapped paths are a 404, not a forwarding attempt.
    let route = state
        .routes
        .resolve(&path)
        .ok_or_else(|| GatewayError::RouteNotFound { path: path.clone() })?;

    // 2. Auth gate.
    state.auth.authorize(&path, &headers).await?;

    // 3. Rate limiting, counted at admission whatever happens downstream.
    let client = client_identity(&headers, peer);
    state.rate_limiter.check(&client, &route.service).await?;

    // 4. Cache lookup; a hit replays the stored status and body verbatim.
    if let Some(hit) = state.cache.lookup(&method, &path).await {
        let status = StatusCode::from_u16(hit.status).unwrap_or(StatusCode::OK);
        info!(
            %method,
            path,
            service = %route.service,
            status = hit.status,
            "served from cache"
        );
        return Ok((status, Json(hit.body)).into_response());
    }

    // 5. Forward.
    let body = axum::body::to_bytes(body, state.config.forwarder.max_body_size)
        .await
        .map_err(|e| GatewayError::internal(format!("failed to read request body: {e}")))?;

    let reply = match state
        .forwarder
        .forward(&route, &method, &headers, query.as_deref(), body)
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            warn!(%method, path, service = %route.service, error = %e, "forwarding failed");
            return Err(e);
        }
    };

    info!(
        %method,
        path,
        service = %route.service,
        status = reply.status.as_u16(),
        "proxied request"
    );

    match reply.body {
        UpstreamBody::Json(value) => {
            if let Err(e) = state
                .cache
                .store_response(&method, &path, reply.status, &value)
                .await
            {
                warn!(path, error = %e, "cache write failed");
            }
            Ok((reply.status, Json(value)).into_response())
        }
        UpstreamBody::Raw { bytes, .. } => {
            // Binary-safe relay: upstream bytes and headers (content type
            // included, hop-by-hop already stripped) pass through untouched.
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = reply.status;
            *response.headers_mut() = reply.headers;
            Ok(response)
        }
    }
}
