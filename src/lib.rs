//! # Campus Gateway
//!
//! A lightweight API gateway for a campus microservice deployment. Requests
//! flow through a fixed pipeline: route resolution, authentication, rate
//! limiting, response caching, and finally upstream forwarding, with any
//! stage able to terminate the request with a JSON error body.
//!
//! The crate is organized around that pipeline:
//!
//! - [`core`] - configuration and the error taxonomy
//! - [`routing`] - the immutable prefix route table
//! - [`auth`] - the bearer-token gate and direct login
//! - [`middleware`] - fixed-window rate limiting
//! - [`caching`] - short-TTL JSON response cache
//! - [`proxy`] - the upstream forwarder
//! - [`store`] - the shared key-value store (memory or Redis)
//! - [`observability`] - logging setup and upstream health probes
//! - [`gateway`] - the axum server tying it all together

pub mod auth;
pub mod caching;
pub mod core;
pub mod gateway;
pub mod middleware;
pub mod observability;
pub mod proxy;
pub mod routing;
pub mod store;

pub use core::config::GatewayConfig;
pub use core::error::{GatewayError, GatewayResult};
pub use gateway::GatewayServer;
