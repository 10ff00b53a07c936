use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chattrix_shared::{AttachmentKind, MessageId, UserId};
use chattrix_store::{ConversationSummary, Message, PinnedMessage};
use serde::Deserialize;

use crate::api::{ack, decode_base64, CurrentUser};
use crate::error::ServerError;
use crate::services::{AttachmentUpload, OutgoingMessage};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(sidebar))
        .route("/unread-counts", get(unread_counts))
        .route("/read/:id", put(mark_read))
        .route("/pin/:id", post(pin_message).delete(unpin_message))
        .route("/pinned/:id", get(pinned_messages))
        .route("/send/:id", post(send_message))
        .route("/:id", get(conversation).delete(delete_message))
}

/// Send payload. At most one of the attachment fields may be set; each holds
/// base64 data or a `data:` URL.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendBody {
    text: Option<String>,
    image: Option<String>,
    video: Option<String>,
    audio: Option<String>,
    document: Option<String>,
    document_name: Option<String>,
    reply_to_message_id: Option<MessageId>,
}

impl SendBody {
    fn into_outgoing(self) -> Result<OutgoingMessage, ServerError> {
        let candidates = [
            (AttachmentKind::Image, self.image),
            (AttachmentKind::Video, self.video),
            (AttachmentKind::Audio, self.audio),
            (AttachmentKind::Document, self.document),
        ];
        let mut present = candidates
            .into_iter()
            .filter_map(|(kind, data)| data.filter(|d| !d.is_empty()).map(|d| (kind, d)));

        let attachment = match present.next() {
            Some((kind, data)) => {
                if present.next().is_some() {
                    return Err(ServerError::InvalidOperation(
                        "A message carries at most one attachment".into(),
                    ));
                }
                Some(AttachmentUpload {
                    kind,
                    data: decode_base64(kind.as_str(), &data)?,
                    document_name: self.document_name,
                })
            }
            None => None,
        };

        Ok(OutgoingMessage {
            text: self.text,
            attachment,
            reply_to: self.reply_to_message_id,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PinBody {
    chat_user_id: UserId,
}

async fn sidebar(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> Result<Json<Vec<ConversationSummary>>, ServerError> {
    Ok(Json(state.messaging.sidebar(me).await?))
}

async fn unread_counts(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> Result<Json<HashMap<UserId, u64>>, ServerError> {
    Ok(Json(state.messaging.unread_counts(me).await?))
}

async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(sender): Path<UserId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let updated = state.messaging.mark_read(me, sender).await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

async fn conversation(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(peer): Path<UserId>,
) -> Result<Json<Vec<Message>>, ServerError> {
    Ok(Json(state.messaging.conversation(me, peer).await?))
}

async fn send_message(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(receiver): Path<UserId>,
    Json(body): Json<SendBody>,
) -> Result<(StatusCode, Json<Message>), ServerError> {
    let message = state
        .messaging
        .send(me, receiver, body.into_outgoing()?)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn delete_message(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(message_id): Path<MessageId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.messaging.delete(message_id, me).await?;
    Ok(ack("Message deleted"))
}

async fn pin_message(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(message_id): Path<MessageId>,
    Json(body): Json<PinBody>,
) -> Result<Json<PinnedMessage>, ServerError> {
    Ok(Json(
        state
            .messaging
            .pin(message_id, me, body.chat_user_id)
            .await?,
    ))
}

async fn unpin_message(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(message_id): Path<MessageId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.messaging.unpin(message_id, me).await?;
    Ok(ack("Message unpinned"))
}

async fn pinned_messages(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(peer): Path<UserId>,
) -> Result<Json<Vec<Message>>, ServerError> {
    Ok(Json(state.messaging.pinned(me, peer).await?))
}
