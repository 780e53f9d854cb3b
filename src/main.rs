use campus_gateway::observability::init_tracing;
use campus_gateway::{GatewayConfig, GatewayServer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = GatewayConfig::load()?;
    info!(
        services = config.services.len(),
        routes = config.routes.len(),
        "configuration loaded"
    );

    let server = GatewayServer::new(config).await?;
    server.serve().await?;

    Ok(())
}
