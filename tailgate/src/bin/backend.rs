//! Backend agent service binary

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tailgate::agent::{CatalogRecommender, RecommendationAgent};
use tailgate::api::{create_router, ApiState};
use tailgate::memory::MemoryStore;
use tailgate::{LogStore, TailgateConfig};
use tracing::info;
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

    info!("Starting tailgate backend v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tailgate.toml".to_string());
    let config = TailgateConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path))?;
    let backend = config.backend;

    info!(
        config_path = config_path,
        max_entries = ?backend.max_entries,
        journal = ?backend.journal_path,
        "Loaded configuration"
    );

    let mut store = LogStore::new();
    if let Some(max) = backend.max_entries {
        store = store.with_max_entries(max);
    }
    if let Some(path) = &backend.journal_path {
        store = store.with_journal(path);
    }
    let logs = Arc::new(store);

    let agent = RecommendationAgent::new(
        Arc::new(CatalogRecommender::new(backend.recommendations)),
        Arc::clone(&logs),
        Arc::new(MemoryStore::new()),
    );

    let mut state = ApiState::new(agent, Arc::clone(&logs));
    state.default_tail_limit = backend.default_tail_limit.max(1);
    let app = create_router(Arc::new(state));

    let addr: SocketAddr = backend
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", backend.bind))?;
    info!("Listening on {}", addr);
    logs.info(format!("Backend listening on {addr}"));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
