//! 24-hour status posts.
//!
//! Expiry is checked against the caller-supplied clock on every read; the
//! background sweep in `main` only reclaims storage.

use std::sync::Arc;

use chattrix_shared::constants::{DEFAULT_STATUS_BACKGROUND, FOLDER_STATUS, STATUS_TTL_HOURS};
use chattrix_shared::{StatusId, StatusKind, UserId};
use chattrix_store::{now, NewStatus, Status, StatusContent, StatusGroup, StatusView, StoreError};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::blob_store::BlobStore;
use crate::config::StatusAudience;
use crate::dispatch::EventDispatcher;
use crate::error::{ServerError, ServerResult};
use crate::events::ServerEvent;
use crate::state::SharedDb;

#[derive(Debug, Clone)]
pub enum StatusDraft {
    Text {
        text: String,
        background_color: Option<String>,
    },
    Media {
        kind: StatusKind,
        data: Vec<u8>,
        caption: Option<String>,
    },
}

#[derive(Clone)]
pub struct StatusService {
    db: SharedDb,
    blob_store: Arc<BlobStore>,
    dispatcher: EventDispatcher,
    audience: StatusAudience,
}

impl StatusService {
    pub fn new(
        db: SharedDb,
        blob_store: Arc<BlobStore>,
        dispatcher: EventDispatcher,
        audience: StatusAudience,
    ) -> Self {
        Self {
            db,
            blob_store,
            dispatcher,
            audience,
        }
    }

    pub async fn create(&self, owner: UserId, draft: StatusDraft) -> ServerResult<Status> {
        if !self.db.lock().await.user_exists(owner)? {
            return Err(ServerError::NotFound("User not found".into()));
        }

        let content = match draft {
            StatusDraft::Text {
                text,
                background_color,
            } => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    return Err(ServerError::InvalidOperation(
                        "Text status cannot be empty".into(),
                    ));
                }
                StatusContent::Text {
                    content: text,
                    background_color: background_color
                        .filter(|c| !c.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_STATUS_BACKGROUND.to_string()),
                }
            }
            StatusDraft::Media {
                kind,
                data,
                caption,
            } => {
                let media = kind.media_kind().ok_or_else(|| {
                    ServerError::InvalidOperation("Media status must be image or video".into())
                })?;
                let url = self.blob_store.upload(&data, media, FOLDER_STATUS).await?;
                let caption = caption.filter(|c| !c.trim().is_empty());
                match kind {
                    StatusKind::Video => StatusContent::Video { content: url, caption },
                    _ => StatusContent::Image { content: url, caption },
                }
            }
        };

        let created_at = now();
        let new = NewStatus {
            id: StatusId::new(),
            owner_id: owner,
            content,
            expires_at: created_at + Duration::hours(STATUS_TTL_HOURS),
            created_at,
        };

        let inserted = self.db.lock().await.insert_status(&new);
        let status = match inserted {
            Ok(status) => status,
            Err(e) => {
                self.discard_media(&new.content).await;
                return Err(e.into());
            }
        };

        info!(status = %status.id, owner = %owner, kind = status.content.kind().as_str(), "Status created");
        self.broadcast(owner, ServerEvent::NewStatus(status.clone()))
            .await;
        Ok(status)
    }

    /// The viewer's feed: their own and their friends' unexpired statuses,
    /// grouped by owner. Groups are ordered by their newest post and each
    /// group lists newest first.
    pub async fn list_visible(
        &self,
        viewer: UserId,
        at: DateTime<Utc>,
    ) -> ServerResult<Vec<StatusGroup>> {
        let statuses = self.db.lock().await.visible_statuses(viewer, at)?;

        let mut groups: Vec<StatusGroup> = Vec::new();
        for status in statuses {
            match groups.iter_mut().find(|g| g.user.id == status.owner.id) {
                Some(group) => group.statuses.push(status),
                None => groups.push(StatusGroup {
                    user: status.owner.clone(),
                    statuses: vec![status],
                }),
            }
        }
        Ok(groups)
    }

    /// Unexpired statuses of `target`, oldest first.
    pub async fn list_for_user(
        &self,
        target: UserId,
        viewer: UserId,
        at: DateTime<Utc>,
    ) -> ServerResult<Vec<Status>> {
        let db = self.db.lock().await;
        if target != viewer {
            if !db.user_exists(target)? {
                return Err(ServerError::NotFound("User not found".into()));
            }
            if !can_see(&db, target, viewer)? {
                return Err(ServerError::Forbidden("Not allowed to view these statuses".into()));
            }
        }
        Ok(db.statuses_for_owner(target, at)?)
    }

    /// Record a view. Only the first view by each viewer is stored and
    /// announced; the owner's own views are not recorded.
    pub async fn mark_viewed(
        &self,
        status_id: StatusId,
        viewer: UserId,
    ) -> ServerResult<Option<StatusView>> {
        let (status, view) = {
            let db = self.db.lock().await;
            let at = now();
            let status = db.get_status(status_id).map_err(status_not_found)?;
            if status.is_expired(at) {
                return Err(ServerError::NotFound("Status not found".into()));
            }
            if status.owner.id == viewer {
                return Ok(None);
            }
            if !can_see(&db, status.owner.id, viewer)? {
                return Err(ServerError::Forbidden("Not allowed to view this status".into()));
            }
            let view = db.record_status_view(status_id, viewer, at)?;
            (status, view)
        };

        let Some(view) = view else {
            debug!(status = %status_id, viewer = %viewer, "Status already viewed");
            return Ok(None);
        };

        self.broadcast(
            status.owner.id,
            ServerEvent::StatusViewed {
                status_id,
                viewer_id: viewer,
                status_owner_id: status.owner.id,
                view: view.clone(),
            },
        )
        .await;
        Ok(Some(view))
    }

    /// Views of a status. Owner only.
    pub async fn views(&self, status_id: StatusId, owner: UserId) -> ServerResult<Vec<StatusView>> {
        let db = self.db.lock().await;
        let status = db.get_status(status_id).map_err(status_not_found)?;
        if status.owner.id != owner {
            return Err(ServerError::Forbidden("Only the owner can see views".into()));
        }
        Ok(status.views)
    }

    pub async fn delete(&self, status_id: StatusId, owner: UserId) -> ServerResult<()> {
        let status = self
            .db
            .lock()
            .await
            .get_status(status_id)
            .map_err(status_not_found)?;
        if status.owner.id != owner {
            return Err(ServerError::Forbidden("Only the owner can delete a status".into()));
        }

        // Resolve the audience while the owner's friendships still hold.
        let audience = self.audience_of(owner).await?;

        self.db.lock().await.delete_status(status_id)?;
        self.discard_media(&status.content).await;

        info!(status = %status_id, owner = %owner, "Status deleted");
        self.emit(audience, ServerEvent::StatusDeleted(status_id))
            .await;
        Ok(())
    }

    /// Physically remove statuses expired at `at`, with their media.
    /// Returns how many were removed.
    pub async fn purge_expired(&self, at: DateTime<Utc>) -> ServerResult<usize> {
        let removed = self.db.lock().await.purge_expired_statuses(at)?;
        for content in &removed {
            self.discard_media(content).await;
        }
        if !removed.is_empty() {
            info!(removed = removed.len(), "Purged expired statuses");
        }
        Ok(removed.len())
    }

    /// Push a status event. Failing to resolve the audience skips the push
    /// and never fails the operation that produced the event.
    async fn broadcast(&self, owner: UserId, event: ServerEvent) {
        match self.audience_of(owner).await {
            Ok(audience) => self.emit(audience, event).await,
            Err(e) => {
                warn!(owner = %owner, event = event.name(), error = %e, "Could not resolve status audience");
            }
        }
    }

    /// `None` means everyone connected.
    async fn audience_of(&self, owner: UserId) -> ServerResult<Option<Vec<UserId>>> {
        match self.audience {
            StatusAudience::All => Ok(None),
            StatusAudience::Friends => {
                let mut users = self.db.lock().await.friend_ids(owner)?;
                users.push(owner);
                Ok(Some(users))
            }
        }
    }

    async fn emit(&self, audience: Option<Vec<UserId>>, event: ServerEvent) {
        match audience {
            None => {
                self.dispatcher.emit_to_all(event).await;
            }
            Some(users) => {
                self.dispatcher.emit_to_users(&users, event).await;
            }
        }
    }

    async fn discard_media(&self, content: &StatusContent) {
        let Some(media) = content.kind().media_kind() else {
            return;
        };
        if let Err(e) = self.blob_store.delete(content.content(), media).await {
            warn!(url = content.content(), error = %e, "Failed to delete status media");
        }
    }
}

/// Whether `viewer` may see statuses owned by `owner`.
fn can_see(db: &chattrix_store::Database, owner: UserId, viewer: UserId) -> ServerResult<bool> {
    Ok(db.are_friends(owner, viewer)? && !db.is_blocked_either(owner, viewer)?)
}

fn status_not_found(err: StoreError) -> ServerError {
    match err {
        StoreError::NotFound => ServerError::NotFound("Status not found".into()),
        other => other.into(),
    }
}
