use std::sync::Arc;

use anyhow::{Context, Error as AnyhowError};
use db::DBService;
use services::services::board_options::BoardOptions;
use services::services::deliverable_sync::DeliverableSyncService;
use services::services::trello::{TrelloConfig, TrelloService};
use sqlx::Error as SqlxError;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod routes;
mod state;

use state::AppState;

#[derive(Debug, Error)]
pub enum TrelloSyncServerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Sqlx(#[from] SqlxError),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

#[tokio::main]
async fn main() -> Result<(), TrelloSyncServerError> {
    // Load .env file if present (for development)
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = DBService::new().await?;

    let trello_config = TrelloConfig::from_env()
        .context("Trello credentials missing (TRELLO_API_KEY / TRELLO_API_TOKEN)")?;
    let controller_url =
        std::env::var("CONTROLLER_URL").context("CONTROLLER_URL must be set for deep links")?;

    // Board layout options are read once at startup; restart to pick up
    // changes.
    let board_options = BoardOptions::load();

    let sync = Arc::new(DeliverableSyncService::new(
        db.pool.clone(),
        Arc::new(TrelloService::new(trello_config)),
        board_options,
        controller_url,
    ));

    let state = AppState::new(sync);
    let app_router = routes::router(state);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.trim().parse::<u16>().ok())
        .unwrap_or_else(|| {
            tracing::info!("No PORT environment variable set, using port 0 for auto-assignment");
            0
        });
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    let actual_port = listener.local_addr()?.port();

    tracing::info!("Server running on http://{host}:{actual_port}");

    axum::serve(listener, app_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Flush pending writes before exiting.
    tracing::info!("Closing database connection pool...");
    db.pool.close().await;

    Ok(())
}

pub async fn shutdown_signal() {
    // Always wait for Ctrl+C
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        // Try to install SIGTERM handler, but don't panic if it fails
        let terminate = async {
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
            } else {
                tracing::error!("Failed to install SIGTERM handler");
                // Fallback: never resolves
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        // Only ctrl_c is available, so just await it
        ctrl_c.await;
    }
}
