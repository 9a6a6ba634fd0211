//! Entrypoint: set up tracing, connect to Postgres, and serve the viewer API
//! together with the metrics & health endpoints.
//!
//! This application uses a strongly-typed configuration (`Settings`) defined in `config.rs`,
//! which provides:
//!  - `database_url`       – Postgres connection string
//!  - `server_bind`        – HTTP bind address
//!  - `default_page_size`  – Rows per page when a request does not say
//!  - `export_row_cap`     – Optional ceiling on CSV export size
//!  - `users`              – Accounts allowed to open a session

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use output_viewer::config::Settings;
use output_viewer::errors::AppError;
use output_viewer::http::{self, AppState};
use output_viewer::store::PgStore;

/// Application entrypoint for the output viewer.
///
/// **Workflow**:
/// 1. Initialise tracing/logging from `RUST_LOG` (or default to `info`).
/// 2. Load `Config.toml` (and apply any `APP__…` env-var overrides).
/// 3. Spin up a Postgres pool.
/// 4. Serve the API, `/metrics` and `/healthz` until Ctrl-C.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // ───────────────────────────────────────────────────────────────
    // 1. Initialise tracing / logging
    // ───────────────────────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
    info!("Starting output viewer…");

    // ───────────────────────────────────────────────────────────────
    // 2. Load configuration
    // ───────────────────────────────────────────────────────────────
    let settings = Settings::new()?;
    info!(?settings, "Loaded configuration");
    if settings.users.is_empty() {
        warn!("No users configured; every API request will be rejected");
    }

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .map_err(|e| AppError::Addr(settings.server_bind.clone(), e))?;

    // ───────────────────────────────────────────────────────────────
    // 3. Database pool
    // ───────────────────────────────────────────────────────────────
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await?;
    info!("Connected to Postgres");

    // ───────────────────────────────────────────────────────────────
    // 4. HTTP server
    // ───────────────────────────────────────────────────────────────
    let state = Arc::new(AppState::new(PgStore::new(pool.clone()), settings));
    http::serve(state, addr, shutdown_signal()).await?;

    pool.close().await;
    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C; shutting down");
    }
    info!("Shutdown requested");
}
