use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use replay_viewer::config::ServerConfig;
use replay_viewer::metrics::{self, Metrics};
use replay_viewer::net::server::ReplayServer;
use replay_viewer::store::LogStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Replay Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    if let Err(e) = config.validate() {
        anyhow::bail!("Invalid configuration: {}", e);
    }
    info!(
        "Configuration loaded: {}:{}, logs={}, log_cache_size={}",
        config.bind_address,
        config.port,
        config.game_logs.display(),
        config.log_cache_size
    );

    let store = Arc::new(LogStore::new(&config.game_logs, config.log_cache_size));
    match store.list_games() {
        Ok(games) => info!("{} recorded games available", games.len()),
        Err(e) => error!("Cannot list game logs: {}", e),
    }

    let metrics = Arc::new(Metrics::new());
    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let server = ReplayServer::new(config, store, metrics);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    info!("Server stopped");
    Ok(())
}
