//! Profile provisioning, called by the auth service.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chattrix_store::User;

use crate::api::CurrentUser;
use crate::error::ServerError;
use crate::services::NewUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(upsert_user))
        .route("/me", get(me))
}

async fn upsert_user(
    State(state): State<AppState>,
    Json(new): Json<NewUser>,
) -> Result<Json<User>, ServerError> {
    Ok(Json(state.relationships.upsert_user(new).await?))
}

async fn me(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> Result<Json<User>, ServerError> {
    Ok(Json(state.relationships.get_user(me).await?))
}
