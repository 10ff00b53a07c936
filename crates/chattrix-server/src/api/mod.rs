//! HTTP and WebSocket surface (axum).
//!
//! Handlers only parse requests, resolve the caller and hand off to the
//! services in [`crate::services`]; every rule lives there.

mod auth;
mod friends;
mod messages;
mod statuses;
mod users;
mod ws;

use std::net::SocketAddr;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderValue, Method},
    routing::get,
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::ServerError;
use crate::state::AppState;

pub use auth::CurrentUser;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);
    let cors = match state.config.cors_origin.as_deref().map(HeaderValue::from_str) {
        Some(Ok(origin)) => cors.allow_origin(origin),
        Some(Err(e)) => {
            warn!(error = %e, "Invalid CORS_ORIGIN, allowing any origin");
            cors.allow_origin(Any)
        }
        None => cors.allow_origin(Any),
    };

    // Attachments arrive base64 encoded inside JSON.
    let body_limit = state.config.max_blob_size / 3 * 4 + 64 * 1024;

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws::ws_handler))
        .route("/blob/:folder/:name", get(blob_download))
        .nest("/api/users", users::router())
        .nest("/api/friends", friends::router())
        .nest("/api/messages", messages::router())
        .nest("/api/status", statuses::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    online: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        online: state.dispatcher.presence().len().await,
    })
}

async fn blob_download(
    State(state): State<AppState>,
    Path((folder, name)): Path<(String, String)>,
) -> Result<Vec<u8>, ServerError> {
    state.blob_store.get(&folder, &name).await
}

/// Decode a base64 payload, accepting `data:<mime>;base64,` URLs as well.
pub(crate) fn decode_base64(field: &str, value: &str) -> Result<Vec<u8>, ServerError> {
    let payload = match value.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => value,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| ServerError::InvalidOperation(format!("Invalid base64 in '{field}': {e}")))
}

/// Plain acknowledgement body.
pub(crate) fn ack(message: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": message }))
}
