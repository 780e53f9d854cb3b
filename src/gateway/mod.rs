//! The gateway HTTP server and request pipeline.

pub mod server;

pub use server::{AppState, GatewayServer};
