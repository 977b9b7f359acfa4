mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use listenboard_api::auth::{AppState, AppStateInner};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "listenboard_server=debug,listenboard_api=debug,listenboard_db=info,listenboard_ingest=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = listenboard_db::Database::open(&config.db_path)?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        cookie_secure: config.cookie_secure,
    });

    if config.sync_on_start {
        run_startup_sync(state.clone(), &config).await;
    }

    let app = listenboard_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Listenboard server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Import any history exports lying in the sync directory. Failures are
/// logged and never keep the server from starting.
async fn run_startup_sync(state: AppState, config: &Config) {
    let dir = config.sync_dir.clone();
    info!("Scanning {} for history exports", dir.display());

    let result = tokio::task::spawn_blocking(move || {
        listenboard_ingest::sync_directory(&state.db, &dir)
    })
    .await;

    match result {
        Ok(Ok(report)) => info!(
            "Startup sync: {} users synced, {} skipped, {} records imported, {} errors",
            report.users_synced,
            report.users_skipped,
            report.records_imported,
            report.errors.len()
        ),
        Ok(Err(e)) => warn!("Startup sync failed: {}", e),
        Err(e) => warn!("Startup sync task panicked: {}", e),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sig) => sig,
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
