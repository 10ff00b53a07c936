use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chattrix_shared::constants::USER_ID_HEADER;
use chattrix_shared::UserId;

use crate::error::ServerError;
use crate::state::AppState;

/// The authenticated caller.
///
/// Authentication happens upstream; the gateway forwards the verified user
/// id in the `x-user-id` header. The id must belong to a provisioned user.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ServerError::Unauthorized("Missing caller identity".into()))?;

        let user = raw
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<UserId>().ok())
            .ok_or_else(|| ServerError::Unauthorized("Malformed caller identity".into()))?;

        if !state.db.lock().await.user_exists(user)? {
            return Err(ServerError::Unauthorized("Unknown user".into()));
        }
        Ok(CurrentUser(user))
    }
}
