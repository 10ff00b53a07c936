//! Live events pushed to connected clients.
//!
//! Every event goes over the wire as `{"event": "<name>", "data": <payload>}`.

use chattrix_shared::{MessageId, StatusId, UserId};
use chattrix_store::{FriendRequest, Message, Status, StatusView};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Full message, to the receiver.
    NewMessage(Message),

    /// Read receipt, to the original sender.
    #[serde(rename_all = "camelCase")]
    MessagesRead { read_by: UserId, sender_id: UserId },

    #[serde(rename_all = "camelCase")]
    MessageDeleted { message_id: MessageId },

    #[serde(rename_all = "camelCase")]
    MessagePinned {
        message_id: MessageId,
        message: Message,
    },

    #[serde(rename_all = "camelCase")]
    MessageUnpinned { message_id: MessageId },

    /// New pending request with the sender populated, to the receiver.
    FriendRequest(FriendRequest),

    /// `user_id` is the user who accepted.
    #[serde(rename_all = "camelCase")]
    FriendRequestAccepted { user_id: UserId },

    #[serde(rename_all = "camelCase")]
    FriendRemoved { user_id: UserId },

    /// `user_id` is the blocker.
    #[serde(rename_all = "camelCase")]
    UserBlocked { user_id: UserId },

    NewStatus(Status),

    #[serde(rename_all = "camelCase")]
    StatusViewed {
        status_id: StatusId,
        viewer_id: UserId,
        status_owner_id: UserId,
        view: StatusView,
    },

    StatusDeleted(StatusId),

    /// Full list of online user ids, to everyone.
    GetOnlineUsers(Vec<UserId>),
}

impl ServerEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "newMessage",
            Self::MessagesRead { .. } => "messagesRead",
            Self::MessageDeleted { .. } => "messageDeleted",
            Self::MessagePinned { .. } => "messagePinned",
            Self::MessageUnpinned { .. } => "messageUnpinned",
            Self::FriendRequest(_) => "friendRequest",
            Self::FriendRequestAccepted { .. } => "friendRequestAccepted",
            Self::FriendRemoved { .. } => "friendRemoved",
            Self::UserBlocked { .. } => "userBlocked",
            Self::NewStatus(_) => "newStatus",
            Self::StatusViewed { .. } => "statusViewed",
            Self::StatusDeleted(_) => "statusDeleted",
            Self::GetOnlineUsers(_) => "getOnlineUsers",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
