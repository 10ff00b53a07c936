use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    FOLDER_CHAT_AUDIOS, FOLDER_CHAT_DOCUMENTS, FOLDER_CHAT_IMAGES, FOLDER_CHAT_VIDEOS,
};
use crate::error::SharedError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = SharedError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| SharedError::InvalidId(s.to_string()))
            }
        }
    };
}

uuid_id!(
    /// Identity of a user, issued by the external auth service.
    UserId
);
uuid_id!(MessageId);
uuid_id!(StatusId);
uuid_id!(FriendRequestId);

/// The unordered pair of participants in a direct conversation.
///
/// Built so that `(a, b)` and `(b, a)` compare equal, which is what the store
/// uses as the uniqueness key for friend requests and pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    low: UserId,
    high: UserId,
}

impl ConversationKey {
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn low(&self) -> UserId {
        self.low
    }

    pub fn high(&self) -> UserId {
        self.high
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.low == user || self.high == user
    }

    /// The participant that is not `user`, if `user` is part of the pair.
    pub fn other(&self, user: UserId) -> Option<UserId> {
        if self.low == user {
            Some(self.high)
        } else if self.high == user {
            Some(self.low)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    Audio,
    Document,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
        }
    }

    /// Blob folder chat attachments of this kind are uploaded to.
    pub fn chat_folder(&self) -> &'static str {
        match self {
            Self::Image => FOLDER_CHAT_IMAGES,
            Self::Video => FOLDER_CHAT_VIDEOS,
            Self::Audio => FOLDER_CHAT_AUDIOS,
            Self::Document => FOLDER_CHAT_DOCUMENTS,
        }
    }
}

impl FromStr for AttachmentKind {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "document" => Ok(Self::Document),
            other => Err(SharedError::InvalidAttachmentKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Text,
    Image,
    Video,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Attachment kind used when uploading the media of this status.
    pub fn media_kind(&self) -> Option<AttachmentKind> {
        match self {
            Self::Text => None,
            Self::Image => Some(AttachmentKind::Image),
            Self::Video => Some(AttachmentKind::Video),
        }
    }
}

impl FromStr for StatusKind {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(SharedError::InvalidStatusKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_key_is_unordered() {
        let a = UserId::new();
        let b = UserId::new();
        let k1 = ConversationKey::new(a, b);
        let k2 = ConversationKey::new(b, a);
        assert_eq!(k1, k2);
        assert!(k1.low() <= k1.high());
        assert_eq!(k1.other(a), Some(b));
        assert_eq!(k1.other(b), Some(a));
        assert_eq!(k1.other(UserId::new()), None);
        assert!(k1.contains(a) && k1.contains(b));
        assert!(!k1.contains(UserId::new()));
    }

    #[test]
    fn user_id_parses_and_serializes_as_plain_string() {
        let id = UserId::new();
        let parsed: UserId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        assert!("not-a-uuid".parse::<UserId>().is_err());
    }

    #[test]
    fn kinds_parse_from_wire_names() {
        assert_eq!("document".parse::<AttachmentKind>().unwrap(), AttachmentKind::Document);
        assert_eq!(AttachmentKind::Audio.chat_folder(), FOLDER_CHAT_AUDIOS);
        assert!("gif".parse::<AttachmentKind>().is_err());

        assert_eq!("video".parse::<StatusKind>().unwrap(), StatusKind::Video);
        assert_eq!(StatusKind::Text.media_kind(), None);
        assert_eq!(StatusKind::Image.media_kind(), Some(AttachmentKind::Image));
    }
}
