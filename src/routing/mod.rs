//! Request routing: static prefix-based dispatch to upstream services.

pub mod route_table;

pub use route_table::{ResolvedRoute, RouteTable};
