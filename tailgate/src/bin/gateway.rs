//! Gateway binary

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tailgate::gateway::{create_router, GatewayState, Upstream};
use tailgate::TailgateConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting tailgate gateway v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tailgate.toml".to_string());
    let config = TailgateConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path))?
        .with_env_overrides();
    let gateway = config.gateway;

    let upstream = Upstream::new(&gateway.backend_url, gateway.request_timeout())?;
    info!(
        backend = upstream.base_url(),
        timeout_secs = gateway.request_timeout_secs,
        "Forwarding to backend"
    );

    let health = upstream.health_check().await;
    if !health.healthy {
        warn!(error = ?health.error, "Backend not reachable yet; requests will fail until it is");
    }

    let app = create_router(Arc::new(GatewayState { upstream }));

    let addr: SocketAddr = gateway
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", gateway.bind))?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
