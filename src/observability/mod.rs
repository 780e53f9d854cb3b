//! Logging setup and upstream health reporting.

pub mod health;

pub use health::{ServiceHealthChecker, ServiceStatusReport};

use tracing_subscriber::EnvFilter;

/// Initialize structured logging. The filter comes from `RUST_LOG` when set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "campus_gateway=info,tower_http=info".into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
