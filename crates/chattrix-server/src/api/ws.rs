//! Live event channel: `GET /ws?userId=<uuid>`.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use chattrix_shared::UserId;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ServerError;
use crate::presence::ConnectionHandle;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    user_id: UserId,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Result<Response, ServerError> {
    let user = state.relationships.get_user(query.user_id).await?;
    Ok(ws
        .on_upgrade(move |socket| ws_connection(socket, state, user.id))
        .into_response())
}

async fn ws_connection(mut socket: WebSocket, state: AppState, user: UserId) {
    let (handle, mut rx) = ConnectionHandle::channel(state.config.event_buffer);
    let conn_id = handle.id;
    state.dispatcher.connect(user, handle).await;

    loop {
        tokio::select! {
            // Forward queued events to the client
            event = rx.recv() => {
                let Some(event) = event else {
                    // Replaced by a newer connection, or shutting down.
                    break;
                };
                match event.to_json() {
                    Ok(json) => {
                        if socket.send(WsMessage::Text(json)).await.is_err() {
                            break; // client disconnected
                        }
                    }
                    Err(e) => warn!(event = event.name(), error = %e, "Failed to encode event"),
                }
            }
            // The channel is push only; inbound frames just keep it alive
            msg = socket.recv() => {
                match inbound(msg) {
                    Inbound::Close => break,
                    Inbound::Reply(frame) => {
                        if socket.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Inbound::Ignore => {}
                }
            }
        }
    }

    debug!(user = %user, conn = %conn_id, "WebSocket closed");
    state.dispatcher.disconnect(conn_id).await;
}

#[derive(Debug, PartialEq)]
enum Inbound {
    Close,
    Reply(WsMessage),
    Ignore,
}

fn inbound(msg: Option<Result<WsMessage, axum::Error>>) -> Inbound {
    match msg {
        Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => Inbound::Close,
        Some(Ok(WsMessage::Ping(data))) => Inbound::Reply(WsMessage::Pong(data)),
        Some(Ok(_)) => Inbound::Ignore,
    }
}
