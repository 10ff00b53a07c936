//! Status posts and their view records.
//!
//! Expiry is a query-time filter (`expires_at > now`); physical removal of
//! expired rows is left to [`Database::purge_expired_statuses`].

use chattrix_shared::{StatusId, StatusKind, UserId};
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::codec::{fmt_ts, get_parsed, get_ts, get_uuid};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{NewStatus, Status, StatusContent, StatusView};
use crate::users::summary_at;

const STATUS_SELECT: &str = "
    SELECT st.id, st.kind, st.content, st.background_color, st.caption,
           st.expires_at, st.created_at,
           u.id, u.full_name, u.profile_pic
    FROM statuses st
    JOIN users u ON u.id = st.owner_id";

impl Database {
    pub fn insert_status(&self, status: &NewStatus) -> Result<Status> {
        let (background_color, caption) = match &status.content {
            StatusContent::Text {
                background_color, ..
            } => (Some(background_color.as_str()), None),
            StatusContent::Image { caption, .. } | StatusContent::Video { caption, .. } => {
                (None, caption.as_deref())
            }
        };

        self.conn()
            .execute(
                "INSERT INTO statuses
                 (id, owner_id, kind, content, background_color, caption, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    status.id.to_string(),
                    status.owner_id.to_string(),
                    status.content.kind().as_str(),
                    status.content.content(),
                    background_color,
                    caption,
                    fmt_ts(&status.expires_at),
                    fmt_ts(&status.created_at),
                ],
            )
            .map_err(StoreError::from_write)?;

        self.get_status(status.id)
    }

    /// Fetch a status regardless of expiry, with its views.
    pub fn get_status(&self, id: StatusId) -> Result<Status> {
        let mut status = self
            .conn()
            .query_row(
                &format!("{STATUS_SELECT} WHERE st.id = ?1"),
                params![id.to_string()],
                row_to_status,
            )
            .map_err(StoreError::from_query)?;
        status.views = self.status_views(id)?;
        Ok(status)
    }

    /// Unexpired statuses owned by `viewer` or a friend of `viewer`, minus
    /// owners blocked in either direction. Newest first.
    pub fn visible_statuses(&self, viewer: UserId, now: DateTime<Utc>) -> Result<Vec<Status>> {
        self.query_statuses(
            &format!(
                "{STATUS_SELECT}
                 WHERE st.expires_at > ?2
                   AND (st.owner_id = ?1
                        OR st.owner_id IN (SELECT friend_id FROM friendships WHERE user_id = ?1))
                   AND st.owner_id NOT IN (SELECT blocked_id FROM blocks WHERE blocker_id = ?1)
                   AND st.owner_id NOT IN (SELECT blocker_id FROM blocks WHERE blocked_id = ?1)
                 ORDER BY st.created_at DESC, st.rowid DESC"
            ),
            viewer,
            now,
        )
    }

    /// Unexpired statuses of one owner, oldest first.
    pub fn statuses_for_owner(&self, owner: UserId, now: DateTime<Utc>) -> Result<Vec<Status>> {
        self.query_statuses(
            &format!(
                "{STATUS_SELECT}
                 WHERE st.owner_id = ?1 AND st.expires_at > ?2
                 ORDER BY st.created_at ASC, st.rowid ASC"
            ),
            owner,
            now,
        )
    }

    fn query_statuses(&self, sql: &str, user: UserId, now: DateTime<Utc>) -> Result<Vec<Status>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map(params![user.to_string(), fmt_ts(&now)], row_to_status)?;

        let mut statuses = Vec::new();
        for row in rows {
            let mut status = row?;
            status.views = self.status_views(status.id)?;
            statuses.push(status);
        }
        Ok(statuses)
    }

    /// Record that `viewer` saw the status.
    ///
    /// Returns the new view on the first call for this viewer and `None` on
    /// every later one; the composite primary key makes the check atomic.
    pub fn record_status_view(
        &self,
        status_id: StatusId,
        viewer: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<StatusView>> {
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO status_views (status_id, viewer_id, viewed_at)
                 VALUES (?1, ?2, ?3)",
                params![status_id.to_string(), viewer.to_string(), fmt_ts(&now)],
            )
            .map_err(StoreError::from_write)?;

        if inserted == 0 {
            return Ok(None);
        }

        let user = self.get_user(viewer)?;
        Ok(Some(StatusView {
            user: (&user).into(),
            viewed_at: now,
        }))
    }

    /// Views of a status, earliest first.
    pub fn status_views(&self, status_id: StatusId) -> Result<Vec<StatusView>> {
        let mut stmt = self.conn().prepare(
            "SELECT v.viewed_at, u.id, u.full_name, u.profile_pic
             FROM status_views v
             JOIN users u ON u.id = v.viewer_id
             WHERE v.status_id = ?1
             ORDER BY v.viewed_at ASC, v.rowid ASC",
        )?;

        let rows = stmt.query_map(params![status_id.to_string()], |row| {
            Ok(StatusView {
                viewed_at: get_ts(row, 0)?,
                user: summary_at(row, 1)?,
            })
        })?;

        let mut views = Vec::new();
        for row in rows {
            views.push(row?);
        }
        Ok(views)
    }

    /// Delete a status and its views. Returns `true` if a row was deleted.
    pub fn delete_status(&self, id: StatusId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM statuses WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }

    /// Physically remove statuses whose expiry has passed.
    ///
    /// Returns the content of every removed row so the caller can drop the
    /// media blobs they point to.
    pub fn purge_expired_statuses(&mut self, now: DateTime<Utc>) -> Result<Vec<StatusContent>> {
        let cutoff = fmt_ts(&now);
        let tx = self.conn_mut().transaction()?;

        let removed = {
            let mut stmt = tx.prepare(
                "SELECT kind, content, background_color, caption
                 FROM statuses WHERE expires_at <= ?1",
            )?;
            let rows = stmt.query_map(params![cutoff], |row| content_at(row, 0))?;
            let mut removed = Vec::new();
            for row in rows {
                removed.push(row?);
            }
            removed
        };

        tx.execute("DELETE FROM statuses WHERE expires_at <= ?1", params![cutoff])?;
        tx.commit()?;
        Ok(removed)
    }
}

/// Decode `kind, content, background_color, caption` starting at `idx`.
fn content_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<StatusContent> {
    let kind = get_parsed::<StatusKind>(row, idx)?;
    let content: String = row.get(idx + 1)?;
    let background_color: Option<String> = row.get(idx + 2)?;
    let caption: Option<String> = row.get(idx + 3)?;

    Ok(match kind {
        StatusKind::Text => StatusContent::Text {
            content,
            background_color: background_color
                .unwrap_or_else(|| chattrix_shared::constants::DEFAULT_STATUS_BACKGROUND.to_string()),
        },
        StatusKind::Image => StatusContent::Image { content, caption },
        StatusKind::Video => StatusContent::Video { content, caption },
    })
}

fn row_to_status(row: &rusqlite::Row<'_>) -> rusqlite::Result<Status> {
    Ok(Status {
        id: StatusId(get_uuid(row, 0)?),
        content: content_at(row, 1)?,
        expires_at: get_ts(row, 5)?,
        created_at: get_ts(row, 6)?,
        owner: summary_at(row, 7)?,
        views: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::now;
    use crate::users::tests::{add_user, befriend};
    use chrono::Duration;

    fn text_status(owner: UserId, text: &str, created_at: DateTime<Utc>) -> NewStatus {
        NewStatus {
            id: StatusId::new(),
            owner_id: owner,
            content: StatusContent::Text {
                content: text.to_string(),
                background_color: "#111111".to_string(),
            },
            expires_at: created_at + Duration::hours(24),
            created_at,
        }
    }

    #[test]
    fn views_are_recorded_once_per_viewer() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "Alice");
        let bob = add_user(&db, "Bob");
        let status = db.insert_status(&text_status(alice.id, "hi", now())).unwrap();

        let first = db.record_status_view(status.id, bob.id, now()).unwrap();
        assert_eq!(first.unwrap().user.id, bob.id);
        assert!(db.record_status_view(status.id, bob.id, now()).unwrap().is_none());

        let stored = db.get_status(status.id).unwrap();
        assert_eq!(stored.views.len(), 1);
    }

    #[test]
    fn expired_statuses_are_filtered_then_purged() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "Alice");
        let created = now();
        let status = db.insert_status(&text_status(alice.id, "hi", created)).unwrap();

        let just_before = status.expires_at - Duration::seconds(1);
        let just_after = status.expires_at + Duration::seconds(1);

        assert_eq!(db.visible_statuses(alice.id, just_before).unwrap().len(), 1);
        assert!(db.visible_statuses(alice.id, status.expires_at).unwrap().is_empty());
        assert!(db.statuses_for_owner(alice.id, just_after).unwrap().is_empty());

        // Still physically present until the sweep runs.
        assert!(db.get_status(status.id).is_ok());
        let removed = db.purge_expired_statuses(just_after).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].content(), "hi");
        assert!(matches!(db.get_status(status.id), Err(StoreError::NotFound)));
    }

    #[test]
    fn visibility_follows_friendship_and_blocks() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "Alice");
        let bob = add_user(&db, "Bob");
        let carol = add_user(&db, "Carol");
        befriend(&db, alice.id, bob.id);

        db.insert_status(&text_status(bob.id, "from bob", now())).unwrap();
        db.insert_status(&text_status(carol.id, "from carol", now())).unwrap();

        let seen: Vec<_> = db
            .visible_statuses(alice.id, now())
            .unwrap()
            .into_iter()
            .map(|s| s.owner.id)
            .collect();
        assert_eq!(seen, vec![bob.id]);

        // Bob blocking Alice hides Bob's statuses from her.
        db.block_user(bob.id, alice.id, now()).unwrap();
        assert!(db.visible_statuses(alice.id, now()).unwrap().is_empty());
    }

    #[test]
    fn owner_listing_is_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "Alice");
        let base = now();
        db.insert_status(&text_status(alice.id, "one", base)).unwrap();
        db.insert_status(&text_status(alice.id, "two", base + Duration::seconds(5)))
            .unwrap();

        let texts: Vec<_> = db
            .statuses_for_owner(alice.id, base + Duration::seconds(10))
            .unwrap()
            .into_iter()
            .map(|s| s.content.content().to_string())
            .collect();
        assert_eq!(texts, vec!["one", "two"]);

        let feed: Vec<_> = db
            .visible_statuses(alice.id, base + Duration::seconds(10))
            .unwrap()
            .into_iter()
            .map(|s| s.content.content().to_string())
            .collect();
        assert_eq!(feed, vec!["two", "one"]);
    }
}
