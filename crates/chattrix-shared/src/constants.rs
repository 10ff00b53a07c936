/// Application name
pub const APP_NAME: &str = "Chattrix";

/// Lifetime of a status post in hours
pub const STATUS_TTL_HOURS: i64 = 24;

/// Background colour stored for text statuses that do not pick one
pub const DEFAULT_STATUS_BACKGROUND: &str = "#000000";

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 5001;

/// Maximum attachment size in bytes (50 MiB)
pub const MAX_ATTACHMENT_SIZE: usize = 50 * 1024 * 1024;

/// Outbound events buffered per live connection before pushes are dropped
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Blob folders, one per attachment kind plus statuses
pub const FOLDER_CHAT_IMAGES: &str = "chat_images";
pub const FOLDER_CHAT_VIDEOS: &str = "chat_videos";
pub const FOLDER_CHAT_AUDIOS: &str = "chat_audios";
pub const FOLDER_CHAT_DOCUMENTS: &str = "chat_documents";
pub const FOLDER_STATUS: &str = "status";

/// Header carrying the caller identity, set by the authenticating gateway
pub const USER_ID_HEADER: &str = "x-user-id";
