use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

mod app;
mod error;
mod http;
mod ingest_worker;
mod summarizer;
mod thread_client;

use cortex_core::config::CortexConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cortex_memoryd=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("CORTEX_CONFIG").ok();
    let config = CortexConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({}), using defaults", e);
        CortexConfig::default()
    });

    let bind = config.memory.bind.clone();
    let port = config.memory.port;
    let ingest_workers = config.memory.ingest_workers;

    let (state, ingest_rx) = app::AppState::new(config)?;
    ingest_worker::spawn_workers(Arc::clone(&state), ingest_rx, ingest_workers);

    let router = app::build_router(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("cortex-memoryd listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
