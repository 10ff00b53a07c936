//! Users, friendships and blocks.

use chattrix_shared::{ConversationKey, UserId};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::codec::{fmt_ts, get_ts, get_uuid};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{User, UserSummary};

const USER_COLUMNS: &str = "u.id, u.email, u.full_name, u.profile_pic, u.created_at";

impl Database {
    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Insert a user or refresh the profile of an existing one.
    ///
    /// Returns [`StoreError::Duplicate`] when the email already belongs to a
    /// different user.
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO users (id, email, full_name, profile_pic, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     email = excluded.email,
                     full_name = excluded.full_name,
                     profile_pic = excluded.profile_pic",
                params![
                    user.id.to_string(),
                    normalize_email(&user.email),
                    user.full_name,
                    user.profile_pic,
                    fmt_ts(&user.created_at),
                ],
            )
            .map_err(StoreError::from_write)?;
        Ok(())
    }

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .map_err(StoreError::from_query)
    }

    pub fn user_exists(&self, id: UserId) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM users WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Exact, case-insensitive email lookup that never returns `excluding`.
    pub fn find_user_by_email(&self, email: &str, excluding: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = ?1 AND u.id != ?2"),
                params![normalize_email(email), excluding.to_string()],
                row_to_user,
            )
            .map_err(StoreError::from_query)
    }

    // ------------------------------------------------------------------
    // Relationship checks
    // ------------------------------------------------------------------

    pub fn are_friends(&self, a: UserId, b: UserId) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM friendships WHERE user_id = ?1 AND friend_id = ?2",
                params![a.to_string(), b.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Whether `blocker` has blocked `blocked` (one direction only).
    pub fn has_blocked(&self, blocker: UserId, blocked: UserId) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
                params![blocker.to_string(), blocked.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Whether either user has blocked the other.
    pub fn is_blocked_either(&self, a: UserId, b: UserId) -> Result<bool> {
        Ok(self.has_blocked(a, b)? || self.has_blocked(b, a)?)
    }

    // ------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------

    /// Friends of `user`, ordered by name.
    pub fn list_friends(&self, user: UserId) -> Result<Vec<User>> {
        self.query_users(
            &format!(
                "SELECT {USER_COLUMNS} FROM users u
                 JOIN friendships f ON f.friend_id = u.id
                 WHERE f.user_id = ?1
                 ORDER BY u.full_name ASC"
            ),
            user,
        )
    }

    pub fn friend_ids(&self, user: UserId) -> Result<Vec<UserId>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT friend_id FROM friendships WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user.to_string()], |row| get_uuid(row, 0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(UserId(row?));
        }
        Ok(ids)
    }

    /// Users that `user` has blocked, most recent block first.
    pub fn list_blocked(&self, user: UserId) -> Result<Vec<User>> {
        self.query_users(
            &format!(
                "SELECT {USER_COLUMNS} FROM users u
                 JOIN blocks b ON b.blocked_id = u.id
                 WHERE b.blocker_id = ?1
                 ORDER BY b.created_at DESC"
            ),
            user,
        )
    }

    fn query_users(&self, sql: &str, user: UserId) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map(params![user.to_string()], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Remove the friendship in both directions together with any friend
    /// request between the pair, in one transaction. Returns `false` if the
    /// two were not friends.
    pub fn remove_friendship(&mut self, a: UserId, b: UserId) -> Result<bool> {
        let tx = self.conn_mut().transaction()?;
        let removed = delete_friendship(&tx, a, b)?;
        delete_requests_between(&tx, a, b)?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// Record that `actor` blocks `target`, dropping their friendship and any
    /// friend request between them. Blocking twice is a no-op.
    pub fn block_user(&mut self, actor: UserId, target: UserId, now: DateTime<Utc>) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO blocks (blocker_id, blocked_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![actor.to_string(), target.to_string(), fmt_ts(&now)],
        )
        .map_err(StoreError::from_write)?;
        delete_friendship(&tx, actor, target)?;
        delete_requests_between(&tx, actor, target)?;
        tx.commit()?;
        Ok(())
    }

    /// Lift `actor`'s block on `target`. Returns `false` if there was none.
    pub fn unblock_user(&self, actor: UserId, target: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
            params![actor.to_string(), target.to_string()],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers (usable inside a transaction)
// ---------------------------------------------------------------------------

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Insert both friendship rows; existing rows are kept.
pub(crate) fn insert_friendship(
    conn: &Connection,
    a: UserId,
    b: UserId,
    now: DateTime<Utc>,
) -> Result<()> {
    let ts = fmt_ts(&now);
    for (user, friend) in [(a, b), (b, a)] {
        conn.execute(
            "INSERT OR IGNORE INTO friendships (user_id, friend_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![user.to_string(), friend.to_string(), ts],
        )
        .map_err(StoreError::from_write)?;
    }
    Ok(())
}

pub(crate) fn delete_friendship(conn: &Connection, a: UserId, b: UserId) -> Result<usize> {
    let affected = conn.execute(
        "DELETE FROM friendships
         WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
        params![a.to_string(), b.to_string()],
    )?;
    Ok(affected)
}

pub(crate) fn delete_requests_between(conn: &Connection, a: UserId, b: UserId) -> Result<usize> {
    let key = ConversationKey::new(a, b);
    let affected = conn.execute(
        "DELETE FROM friend_requests WHERE pair_low = ?1 AND pair_high = ?2",
        params![key.low().to_string(), key.high().to_string()],
    )?;
    Ok(affected)
}

pub(crate) fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(get_uuid(row, 0)?),
        email: row.get(1)?,
        full_name: row.get(2)?,
        profile_pic: row.get(3)?,
        created_at: get_ts(row, 4)?,
    })
}

/// Map three consecutive columns (`id, full_name, profile_pic`) starting at
/// `start` to a [`UserSummary`].
pub(crate) fn summary_at(row: &rusqlite::Row<'_>, start: usize) -> rusqlite::Result<UserSummary> {
    Ok(UserSummary {
        id: UserId(get_uuid(row, start)?),
        full_name: row.get(start + 1)?,
        profile_pic: row.get(start + 2)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::codec::now;

    pub(crate) fn add_user(db: &Database, name: &str) -> User {
        let user = User {
            id: UserId::new(),
            email: format!("{}@example.com", name.to_lowercase()),
            full_name: name.to_string(),
            profile_pic: None,
            created_at: now(),
        };
        db.upsert_user(&user).unwrap();
        user
    }

    pub(crate) fn befriend(db: &Database, a: UserId, b: UserId) {
        insert_friendship(db.conn(), a, b, now()).unwrap();
    }

    #[test]
    fn email_lookup_is_case_insensitive_and_excludes_requester() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "Alice");
        let bob = add_user(&db, "Bob");

        let found = db.find_user_by_email("  BOB@Example.com ", alice.id).unwrap();
        assert_eq!(found.id, bob.id);

        assert!(matches!(
            db.find_user_by_email("alice@example.com", alice.id),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn email_taken_by_another_user_is_duplicate() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "Alice");

        let impostor = User {
            id: UserId::new(),
            email: "ALICE@example.com".into(),
            full_name: "Not Alice".into(),
            profile_pic: None,
            created_at: now(),
        };
        assert!(matches!(db.upsert_user(&impostor), Err(StoreError::Duplicate)));

        // Updating one's own profile is fine.
        let renamed = User {
            full_name: "Alice B".into(),
            ..alice.clone()
        };
        db.upsert_user(&renamed).unwrap();
        assert_eq!(db.get_user(alice.id).unwrap().full_name, "Alice B");
    }

    #[test]
    fn block_drops_friendship_and_is_one_directional_state() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "Alice");
        let bob = add_user(&db, "Bob");
        befriend(&db, alice.id, bob.id);
        assert!(db.are_friends(alice.id, bob.id).unwrap());
        assert!(db.are_friends(bob.id, alice.id).unwrap());

        db.block_user(alice.id, bob.id, now()).unwrap();
        db.block_user(alice.id, bob.id, now()).unwrap();

        assert!(!db.are_friends(alice.id, bob.id).unwrap());
        assert!(!db.are_friends(bob.id, alice.id).unwrap());
        assert!(db.has_blocked(alice.id, bob.id).unwrap());
        assert!(!db.has_blocked(bob.id, alice.id).unwrap());
        assert!(db.is_blocked_either(bob.id, alice.id).unwrap());
        assert_eq!(db.list_blocked(alice.id).unwrap().len(), 1);

        assert!(db.unblock_user(alice.id, bob.id).unwrap());
        assert!(!db.unblock_user(alice.id, bob.id).unwrap());
        assert!(!db.is_blocked_either(alice.id, bob.id).unwrap());
        assert!(!db.are_friends(alice.id, bob.id).unwrap());
    }

    #[test]
    fn remove_friendship_is_symmetric() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "Alice");
        let bob = add_user(&db, "Bob");
        let carol = add_user(&db, "Carol");
        befriend(&db, alice.id, bob.id);
        befriend(&db, alice.id, carol.id);

        assert!(db.remove_friendship(bob.id, alice.id).unwrap());
        assert!(!db.remove_friendship(alice.id, bob.id).unwrap());

        assert_eq!(db.friend_ids(alice.id).unwrap(), vec![carol.id]);
        assert!(db.friend_ids(bob.id).unwrap().is_empty());
        let names: Vec<_> = db
            .list_friends(carol.id)
            .unwrap()
            .into_iter()
            .map(|u| u.full_name)
            .collect();
        assert_eq!(names, vec!["Alice".to_string()]);
    }
}
