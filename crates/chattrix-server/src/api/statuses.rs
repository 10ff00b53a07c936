use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use chattrix_shared::{StatusId, StatusKind, UserId};
use chattrix_store::{now, Status, StatusGroup, StatusView};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::{ack, decode_base64, CurrentUser};
use crate::error::ServerError;
use crate::services::StatusDraft;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(feed).post(create_status))
        .route("/views/:status_id", get(status_views))
        .route("/view/:status_id", put(view_status))
        // GET takes a user id, DELETE a status id.
        .route("/:id", get(user_statuses).delete(delete_status))
}

/// `content` is the text for text statuses and base64 media otherwise.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody {
    #[serde(rename = "type")]
    kind: StatusKind,
    content: String,
    background_color: Option<String>,
    caption: Option<String>,
}

async fn create_status(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Json(body): Json<CreateBody>,
) -> Result<(StatusCode, Json<Status>), ServerError> {
    let draft = match body.kind {
        StatusKind::Text => StatusDraft::Text {
            text: body.content,
            background_color: body.background_color,
        },
        kind => StatusDraft::Media {
            kind,
            data: decode_base64("content", &body.content)?,
            caption: body.caption,
        },
    };
    let status = state.statuses.create(me, draft).await?;
    Ok((StatusCode::CREATED, Json(status)))
}

async fn feed(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> Result<Json<Vec<StatusGroup>>, ServerError> {
    Ok(Json(state.statuses.list_visible(me, now()).await?))
}

async fn user_statuses(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Status>>, ServerError> {
    Ok(Json(
        state
            .statuses
            .list_for_user(UserId(id), me, now())
            .await?,
    ))
}

async fn status_views(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(status_id): Path<StatusId>,
) -> Result<Json<Vec<StatusView>>, ServerError> {
    Ok(Json(state.statuses.views(status_id, me).await?))
}

async fn view_status(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(status_id): Path<StatusId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.statuses.mark_viewed(status_id, me).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn delete_status(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.statuses.delete(StatusId(id), me).await?;
    Ok(ack("Status deleted"))
}
