use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::api::{self, AppState, SharedState};
use super::db::{BoardDb, DbHandle};

/// Configuration for the board server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3141,
            db_path: PathBuf::from(".kanban/kanban.db"),
            dev_mode: false,
        }
    }
}

impl ServerConfig {
    /// Dev mode listens on all interfaces so a separately served UI can reach it.
    pub fn bind_host(&self) -> &str {
        if self.dev_mode { "0.0.0.0" } else { &self.host }
    }
}

/// Build the full application router: API, WebSocket and request tracing.
pub fn build_router(state: SharedState, dev_mode: bool) -> Router {
    let mut app = api::api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Open the database and serve until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    if let Some(parent) = config.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let db = BoardDb::new(&config.db_path).context("Failed to initialize board database")?;
    let state = AppState::new(DbHandle::new(db));
    let app = build_router(state, config.dev_mode);

    let addr = format!("{}:{}", config.bind_host(), config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr: SocketAddr = listener.local_addr()?;
    tracing::info!(%local_addr, db_path = %config.db_path.display(), dev_mode = config.dev_mode, "Server listening");
    println!("Kanban board running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
