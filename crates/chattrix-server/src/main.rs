//! # chattrix-server
//!
//! Real-time chat backend for Chattrix.
//!
//! This binary provides:
//! - **Relationship graph**: users, friend requests, friendships and blocks
//! - **Messaging**: direct messages with attachments, replies, read receipts,
//!   pins and unread counters
//! - **Statuses**: 24-hour posts with per-viewer view tracking
//! - **Presence + live events** over WebSocket, best-effort and at-most-once
//! - **Blob storage** on the local filesystem for attachments and status media
//! - **REST API** (axum) for all of the above

mod api;
mod blob_store;
mod config;
mod dispatch;
mod error;
mod events;
mod presence;
mod services;
mod state;

#[cfg(test)]
mod test_support;

use std::time::Duration;

use chattrix_store::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::blob_store::BlobStore;
use crate::config::ServerConfig;
use crate::presence::PresenceRegistry;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,chattrix_server=debug,chattrix_store=info")
            }),
        )
        .init();

    info!(
        "Starting {} server v{}",
        chattrix_shared::constants::APP_NAME,
        env!("CARGO_PKG_VERSION")
    );

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)?;
    info!(path = ?db.path(), "Database ready");

    let blob_store = BlobStore::new(
        config.blob_storage_path.clone(),
        config.public_base_url.clone(),
        config.max_blob_size,
    )
    .await?;

    // Lives for the whole process; cleared on shutdown below.
    let presence = PresenceRegistry::new();

    let http_addr = config.http_addr;
    let sweep_every = Duration::from_secs(config.status_sweep_interval_secs.max(1));
    let app_state = AppState::new(db, blob_store, presence.clone(), config);

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic physical removal of expired statuses
    let statuses = app_state.statuses.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            if let Err(e) = statuses.purge_expired(chattrix_store::now()).await {
                tracing::warn!(error = %e, "Status sweep failed");
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    // Clearing the registry drops every outbound sender and ends open sockets.
    let shutdown_presence = presence.clone();
    let result = api::serve(app_state, http_addr, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
        shutdown_presence.clear().await;
    })
    .await;

    if let Err(e) = result {
        tracing::error!(error = %e, "HTTP server failed");
        return Err(e);
    }
    Ok(())
}
