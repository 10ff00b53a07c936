//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to HTTP responses and live events. Field names go out in
//! camelCase, which is what the web client reads.

use std::str::FromStr;

use chattrix_shared::{
    AttachmentKind, ConversationKey, FriendRequestId, MessageId, StatusId, StatusKind, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user profile. Credentials live with the auth service, never here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    /// Trimmed and lower-cased on write.
    pub email: String,
    pub full_name: String,
    /// Blob URL of the avatar, if any.
    pub profile_pic: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The public slice of a [`User`] embedded in requests, statuses and views.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub full_name: String,
    pub profile_pic: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name.clone(),
            profile_pic: user.profile_pic.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Friend request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
}

impl FriendRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }
}

impl FromStr for FriendRequestStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            other => Err(StoreError::InvalidData(format!(
                "unknown friend request status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: FriendRequestId,
    pub sender: UserSummary,
    pub receiver: UserSummary,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A message attachment: exactly one kind, already stored in the blob store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Attachment {
    Image { url: String },
    Video { url: String },
    Audio { url: String },
    Document { url: String, name: Option<String> },
}

impl Attachment {
    pub fn new(kind: AttachmentKind, url: String, document_name: Option<String>) -> Self {
        match kind {
            AttachmentKind::Image => Self::Image { url },
            AttachmentKind::Video => Self::Video { url },
            AttachmentKind::Audio => Self::Audio { url },
            AttachmentKind::Document => Self::Document {
                url,
                name: document_name,
            },
        }
    }

    pub fn kind(&self) -> AttachmentKind {
        match self {
            Self::Image { .. } => AttachmentKind::Image,
            Self::Video { .. } => AttachmentKind::Video,
            Self::Audio { .. } => AttachmentKind::Audio,
            Self::Document { .. } => AttachmentKind::Document,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Image { url } | Self::Video { url } | Self::Audio { url } => url,
            Self::Document { url, .. } => url,
        }
    }

    pub fn document_name(&self) -> Option<&str> {
        match self {
            Self::Document { name, .. } => name.as_deref(),
            _ => None,
        }
    }
}

/// Copy of the replied-to message taken at send time. Later edits or
/// deletion of the original do not touch it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplySnapshot {
    pub message_id: MessageId,
    pub text: Option<String>,
    pub sender_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
    pub reply_to: Option<ReplySnapshot>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn conversation(&self) -> ConversationKey {
        ConversationKey::new(self.sender_id, self.receiver_id)
    }

    pub fn is_participant(&self, user: UserId) -> bool {
        self.conversation().contains(user)
    }

    /// The participant on the other side from `user`.
    pub fn other_party(&self, user: UserId) -> Option<UserId> {
        self.conversation().other(user)
    }
}

/// The pin attached to a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PinnedMessage {
    pub id: Uuid,
    pub message_id: MessageId,
    pub chat_users: [UserId; 2],
    pub pinned_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// A friend together with the latest message exchanged with them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub user: User,
    pub last_message: Option<Message>,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Status body. Text statuses carry a background colour, media statuses
/// carry the blob URL in `content` and an optional caption.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StatusContent {
    #[serde(rename_all = "camelCase")]
    Text {
        content: String,
        background_color: String,
    },
    Image {
        content: String,
        caption: Option<String>,
    },
    Video {
        content: String,
        caption: Option<String>,
    },
}

impl StatusContent {
    pub fn kind(&self) -> StatusKind {
        match self {
            Self::Text { .. } => StatusKind::Text,
            Self::Image { .. } => StatusKind::Image,
            Self::Video { .. } => StatusKind::Video,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Text { content, .. }
            | Self::Image { content, .. }
            | Self::Video { content, .. } => content,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub user: UserSummary,
    pub viewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub id: StatusId,
    pub owner: UserSummary,
    #[serde(flatten)]
    pub content: StatusContent,
    /// Oldest view first, one entry per viewer.
    pub views: Vec<StatusView>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Status {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Input for [`crate::Database::insert_status`].
#[derive(Debug, Clone)]
pub struct NewStatus {
    pub id: StatusId,
    pub owner_id: UserId,
    pub content: StatusContent,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Statuses of one owner, as shown in the feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusGroup {
    pub user: UserSummary,
    pub statuses: Vec<Status>,
}
