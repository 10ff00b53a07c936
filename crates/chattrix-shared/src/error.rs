use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("Invalid attachment kind: {0}")]
    InvalidAttachmentKind(String),

    #[error("Invalid status kind: {0}")]
    InvalidStatusKind(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),
}
