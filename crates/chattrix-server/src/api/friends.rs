use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use chattrix_shared::{FriendRequestId, UserId};
use chattrix_store::{FriendRequest, User};
use serde::Deserialize;

use crate::api::{ack, CurrentUser};
use crate::error::ServerError;
use crate::services::{RequestAction, UserSearchResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_friends))
        .route("/search", post(search))
        .route("/request", post(send_request))
        .route("/requests", get(received_requests))
        .route("/requests/sent", get(sent_requests))
        .route("/request/:request_id/accept", put(accept_request))
        .route("/request/:request_id/reject", delete(reject_request))
        .route("/request/:request_id/cancel", delete(cancel_request))
        .route("/remove/:user_id", delete(remove_friend))
        .route("/block/:user_id", post(block_user))
        .route("/unblock/:user_id", delete(unblock_user))
        .route("/blocked", get(blocked_users))
}

#[derive(Deserialize)]
struct SearchBody {
    email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody {
    receiver_id: UserId,
}

async fn list_friends(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> Result<Json<Vec<User>>, ServerError> {
    Ok(Json(state.relationships.list_friends(me).await?))
}

async fn search(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Json(body): Json<SearchBody>,
) -> Result<Json<UserSearchResult>, ServerError> {
    Ok(Json(
        state.relationships.search_by_email(me, &body.email).await?,
    ))
}

async fn send_request(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Json(body): Json<RequestBody>,
) -> Result<(StatusCode, Json<FriendRequest>), ServerError> {
    let request = state
        .relationships
        .send_request(me, body.receiver_id)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn received_requests(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> Result<Json<Vec<FriendRequest>>, ServerError> {
    Ok(Json(state.relationships.list_received_requests(me).await?))
}

async fn sent_requests(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> Result<Json<Vec<FriendRequest>>, ServerError> {
    Ok(Json(state.relationships.list_sent_requests(me).await?))
}

async fn accept_request(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(request_id): Path<FriendRequestId>,
) -> Result<Json<FriendRequest>, ServerError> {
    let request = state
        .relationships
        .respond(request_id, me, RequestAction::Accept)
        .await?;
    Ok(Json(request))
}

async fn reject_request(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(request_id): Path<FriendRequestId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state
        .relationships
        .respond(request_id, me, RequestAction::Reject)
        .await?;
    Ok(ack("Friend request rejected"))
}

async fn cancel_request(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(request_id): Path<FriendRequestId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state
        .relationships
        .respond(request_id, me, RequestAction::Cancel)
        .await?;
    Ok(ack("Friend request cancelled"))
}

async fn remove_friend(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(friend): Path<UserId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.relationships.remove_friend(me, friend).await?;
    Ok(ack("Friend removed"))
}

async fn block_user(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(target): Path<UserId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.relationships.block(me, target).await?;
    Ok(ack("User blocked"))
}

async fn unblock_user(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(target): Path<UserId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.relationships.unblock(me, target).await?;
    Ok(ack("User unblocked"))
}

async fn blocked_users(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> Result<Json<Vec<User>>, ServerError> {
    Ok(Json(state.relationships.list_blocked(me).await?))
}
