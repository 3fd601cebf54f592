use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

mod handlers;
mod middleware;
mod routes;
mod state;

use common::config::Settings;
use common::db::DbPool;
use common::scheduler::{DbPollerStore, HostStatusPoller};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Settings::load()?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    common::telemetry::init_logging(
        &config.observability.log_level,
        config.observability.json_logs,
    )?;
    common::telemetry::init_metrics(config.observability.metrics_port)?;

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting API server"
    );

    let db_pool = DbPool::new(&config.database).await?;
    db_pool.migrate().await?;
    tracing::info!("Database ready");

    let state = AppState::new(db_pool.clone(), config.clone());

    // Background reachability poller, stopped via the shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller_handle = if config.poller.enabled {
        let poller = HostStatusPoller::new(
            Arc::clone(&state.sessions),
            Arc::new(DbPollerStore::new(state.host_repo())),
            config.poller_interval(),
        );
        Some(tokio::spawn(async move {
            poller.run(shutdown_rx).await;
        }))
    } else {
        tracing::info!("Host status poller disabled");
        None
    };

    let app = routes::create_router(state);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    tracing::info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = poller_handle {
        let _ = handle.await;
    }
    db_pool.close().await;

    tracing::info!("API server stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Initiating graceful shutdown");
}
