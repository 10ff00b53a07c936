//! CRUD operations for [`FriendRequest`] records.

use chattrix_shared::{ConversationKey, FriendRequestId, UserId};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::codec::{fmt_ts, get_parsed, get_ts, get_uuid};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{FriendRequest, FriendRequestStatus};
use crate::users::{insert_friendship, summary_at};

const REQUEST_SELECT: &str = "
    SELECT fr.id, fr.status, fr.created_at,
           s.id, s.full_name, s.profile_pic,
           r.id, r.full_name, r.profile_pic
    FROM friend_requests fr
    JOIN users s ON s.id = fr.sender_id
    JOIN users r ON r.id = fr.receiver_id";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a pending request.
    ///
    /// Any existing record between the pair, in either direction and in any
    /// state, makes this fail with [`StoreError::Duplicate`]; the check is the
    /// unique index on the unordered pair, so it holds for concurrent callers.
    pub fn insert_friend_request(
        &self,
        id: FriendRequestId,
        sender: UserId,
        receiver: UserId,
        now: DateTime<Utc>,
    ) -> Result<FriendRequest> {
        let key = ConversationKey::new(sender, receiver);
        self.conn()
            .execute(
                "INSERT INTO friend_requests
                 (id, sender_id, receiver_id, pair_low, pair_high, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.to_string(),
                    sender.to_string(),
                    receiver.to_string(),
                    key.low().to_string(),
                    key.high().to_string(),
                    FriendRequestStatus::Pending.as_str(),
                    fmt_ts(&now),
                ],
            )
            .map_err(StoreError::from_write)?;

        self.get_friend_request(id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_friend_request(&self, id: FriendRequestId) -> Result<FriendRequest> {
        self.conn()
            .query_row(
                &format!("{REQUEST_SELECT} WHERE fr.id = ?1"),
                params![id.to_string()],
                row_to_request,
            )
            .map_err(StoreError::from_query)
    }

    /// The request between two users regardless of who sent it.
    pub fn find_request_between(&self, a: UserId, b: UserId) -> Result<Option<FriendRequest>> {
        let key = ConversationKey::new(a, b);
        let request = self
            .conn()
            .query_row(
                &format!("{REQUEST_SELECT} WHERE fr.pair_low = ?1 AND fr.pair_high = ?2"),
                params![key.low().to_string(), key.high().to_string()],
                row_to_request,
            )
            .optional()?;
        Ok(request)
    }

    /// Pending requests addressed to `user`, newest first.
    pub fn list_received_requests(&self, user: UserId) -> Result<Vec<FriendRequest>> {
        self.query_requests(
            &format!(
                "{REQUEST_SELECT}
                 WHERE fr.receiver_id = ?1 AND fr.status = 'pending'
                 ORDER BY fr.created_at DESC"
            ),
            user,
        )
    }

    /// Pending requests sent by `user`, newest first.
    pub fn list_sent_requests(&self, user: UserId) -> Result<Vec<FriendRequest>> {
        self.query_requests(
            &format!(
                "{REQUEST_SELECT}
                 WHERE fr.sender_id = ?1 AND fr.status = 'pending'
                 ORDER BY fr.created_at DESC"
            ),
            user,
        )
    }

    fn query_requests(&self, sql: &str, user: UserId) -> Result<Vec<FriendRequest>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map(params![user.to_string()], row_to_request)?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }

    // ------------------------------------------------------------------
    // Update / delete
    // ------------------------------------------------------------------

    /// Mark a pending request accepted and make both users friends, all in
    /// one transaction.
    ///
    /// Fails with [`StoreError::AlreadyResolved`] if the request is no longer
    /// pending. Re-running after a partial failure is safe: the friendship
    /// rows are inserted with `OR IGNORE`.
    pub fn accept_friend_request(&mut self, id: FriendRequestId, now: DateTime<Utc>) -> Result<()> {
        let tx = self.conn_mut().transaction()?;

        let parties: Option<(String, String)> = tx
            .query_row(
                "SELECT sender_id, receiver_id FROM friend_requests WHERE id = ?1",
                params![id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((sender, receiver)) = parties else {
            return Err(StoreError::NotFound);
        };

        let affected = tx.execute(
            "UPDATE friend_requests SET status = 'accepted'
             WHERE id = ?1 AND status = 'pending'",
            params![id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::AlreadyResolved);
        }

        let sender = sender
            .parse::<UserId>()
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        let receiver = receiver
            .parse::<UserId>()
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        insert_friendship(&tx, sender, receiver, now)?;

        tx.commit()?;
        Ok(())
    }

    /// Delete a request by id. Returns `true` if a row was deleted.
    pub fn delete_friend_request(&self, id: FriendRequestId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM friend_requests WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<FriendRequest> {
    Ok(FriendRequest {
        id: FriendRequestId(get_uuid(row, 0)?),
        status: get_parsed::<FriendRequestStatus>(row, 1)?,
        created_at: get_ts(row, 2)?,
        sender: summary_at(row, 3)?,
        receiver: summary_at(row, 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::now;
    use crate::users::tests::add_user;

    #[test]
    fn pair_allows_a_single_record_in_either_direction() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "Alice");
        let bob = add_user(&db, "Bob");

        let req = db
            .insert_friend_request(FriendRequestId::new(), alice.id, bob.id, now())
            .unwrap();
        assert_eq!(req.status, FriendRequestStatus::Pending);
        assert_eq!(req.sender.id, alice.id);
        assert_eq!(req.receiver.full_name, "Bob");

        assert!(matches!(
            db.insert_friend_request(FriendRequestId::new(), alice.id, bob.id, now()),
            Err(StoreError::Duplicate)
        ));
        assert!(matches!(
            db.insert_friend_request(FriendRequestId::new(), bob.id, alice.id, now()),
            Err(StoreError::Duplicate)
        ));

        let found = db.find_request_between(bob.id, alice.id).unwrap().unwrap();
        assert_eq!(found.id, req.id);
    }

    #[test]
    fn accept_updates_status_and_friend_sets_once() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "Alice");
        let bob = add_user(&db, "Bob");
        let req = db
            .insert_friend_request(FriendRequestId::new(), alice.id, bob.id, now())
            .unwrap();

        db.accept_friend_request(req.id, now()).unwrap();

        assert!(db.are_friends(alice.id, bob.id).unwrap());
        assert!(db.are_friends(bob.id, alice.id).unwrap());
        assert_eq!(
            db.get_friend_request(req.id).unwrap().status,
            FriendRequestStatus::Accepted
        );
        assert!(db.list_received_requests(bob.id).unwrap().is_empty());
        assert!(db.list_sent_requests(alice.id).unwrap().is_empty());

        assert!(matches!(
            db.accept_friend_request(req.id, now()),
            Err(StoreError::AlreadyResolved)
        ));
        assert!(matches!(
            db.accept_friend_request(FriendRequestId::new(), now()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn listings_only_show_pending_for_the_right_side() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "Alice");
        let bob = add_user(&db, "Bob");
        let carol = add_user(&db, "Carol");

        db.insert_friend_request(FriendRequestId::new(), alice.id, bob.id, now())
            .unwrap();
        db.insert_friend_request(FriendRequestId::new(), carol.id, bob.id, now())
            .unwrap();

        assert_eq!(db.list_received_requests(bob.id).unwrap().len(), 2);
        assert!(db.list_received_requests(alice.id).unwrap().is_empty());
        assert_eq!(db.list_sent_requests(carol.id).unwrap().len(), 1);

        // Dropping the (non-existent) friendship clears the pair's request too.
        assert!(!db.remove_friendship(bob.id, alice.id).unwrap());
        assert_eq!(db.list_received_requests(bob.id).unwrap().len(), 1);
    }
}
