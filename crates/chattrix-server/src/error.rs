use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chattrix_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Blob too large: {size} bytes (max {max})")]
    BlobTooLarge { size: usize, max: usize },

    #[error("Blob storage error: {0}")]
    BlobStorage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServerError::NotFound("Record not found".into()),
            StoreError::Duplicate => ServerError::Conflict("Record already exists".into()),
            StoreError::AlreadyResolved => ServerError::Conflict("Already processed".into()),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ServerError::InvalidOperation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::BlobTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            ServerError::BlobStorage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Blob storage error".to_string())
            }
            ServerError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert!(matches!(
            ServerError::from(StoreError::NotFound),
            ServerError::NotFound(_)
        ));
        assert!(matches!(
            ServerError::from(StoreError::Duplicate),
            ServerError::Conflict(_)
        ));
        assert!(matches!(
            ServerError::from(StoreError::Migration("boom".into())),
            ServerError::Internal(_)
        ));
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let response = ServerError::Internal("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = ServerError::Conflict("Already friends".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
