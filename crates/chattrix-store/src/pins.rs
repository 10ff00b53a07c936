//! Conversation pins.
//!
//! A conversation holds at most one pin (unique index on the unordered
//! pair). Pinning another message in the same conversation replaces the old
//! pin; pinning the already-pinned message is a duplicate.

use chattrix_shared::{ConversationKey, MessageId, UserId};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::codec::{fmt_ts, get_ts, get_uuid};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Message, PinnedMessage};

/// Result of [`Database::pin_message`].
#[derive(Debug, Clone)]
pub struct PinOutcome {
    pub pin: PinnedMessage,
    /// The message whose pin was replaced, if the conversation had one.
    pub replaced: Option<MessageId>,
}

impl Database {
    pub fn pin_message(
        &mut self,
        message_id: MessageId,
        chat: ConversationKey,
        pinned_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<PinOutcome> {
        let tx = self.conn_mut().transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT message_id FROM pinned_messages WHERE pair_low = ?1 AND pair_high = ?2",
                params![chat.low().to_string(), chat.high().to_string()],
                |row| row.get(0),
            )
            .optional()?;

        let replaced = match existing {
            Some(raw) => {
                let current = raw
                    .parse::<MessageId>()
                    .map_err(|e| StoreError::InvalidData(e.to_string()))?;
                if current == message_id {
                    return Err(StoreError::Duplicate);
                }
                tx.execute(
                    "DELETE FROM pinned_messages WHERE pair_low = ?1 AND pair_high = ?2",
                    params![chat.low().to_string(), chat.high().to_string()],
                )?;
                Some(current)
            }
            None => None,
        };

        let pin = PinnedMessage {
            id: Uuid::new_v4(),
            message_id,
            chat_users: [chat.low(), chat.high()],
            pinned_by,
            created_at: now,
        };
        tx.execute(
            "INSERT INTO pinned_messages (id, message_id, pair_low, pair_high, pinned_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                pin.id.to_string(),
                message_id.to_string(),
                chat.low().to_string(),
                chat.high().to_string(),
                pinned_by.to_string(),
                fmt_ts(&now),
            ],
        )
        .map_err(StoreError::from_write)?;

        tx.commit()?;
        Ok(PinOutcome { pin, replaced })
    }

    pub fn get_pin_for_message(&self, message_id: MessageId) -> Result<Option<PinnedMessage>> {
        let pin = self
            .conn()
            .query_row(
                "SELECT id, message_id, pair_low, pair_high, pinned_by, created_at
                 FROM pinned_messages WHERE message_id = ?1",
                params![message_id.to_string()],
                row_to_pin,
            )
            .optional()?;
        Ok(pin)
    }

    /// Remove the pin(s) on a message. Returns the number removed.
    pub fn delete_pins_for_message(&self, message_id: MessageId) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM pinned_messages WHERE message_id = ?1",
            params![message_id.to_string()],
        )?;
        Ok(affected)
    }

    /// The currently pinned message of a conversation, if any.
    pub fn pinned_message_for(&self, chat: ConversationKey) -> Result<Option<Message>> {
        let message_id: Option<String> = self
            .conn()
            .query_row(
                "SELECT message_id FROM pinned_messages WHERE pair_low = ?1 AND pair_high = ?2",
                params![chat.low().to_string(), chat.high().to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match message_id {
            Some(raw) => {
                let id = raw
                    .parse::<MessageId>()
                    .map_err(|e| StoreError::InvalidData(e.to_string()))?;
                match self.get_message(id) {
                    Ok(message) => Ok(Some(message)),
                    Err(StoreError::NotFound) => Ok(None),
                    Err(e) => Err(e),
                }
            }
            None => Ok(None),
        }
    }
}

fn row_to_pin(row: &rusqlite::Row<'_>) -> rusqlite::Result<PinnedMessage> {
    Ok(PinnedMessage {
        id: get_uuid(row, 0)?,
        message_id: MessageId(get_uuid(row, 1)?),
        chat_users: [UserId(get_uuid(row, 2)?), UserId(get_uuid(row, 3)?)],
        pinned_by: UserId(get_uuid(row, 4)?),
        created_at: get_ts(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::now;
    use crate::messages::tests::text_message;
    use crate::users::tests::add_user;

    #[test]
    fn one_pin_per_conversation() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "Alice");
        let bob = add_user(&db, "Bob");
        let chat = ConversationKey::new(alice.id, bob.id);

        let first = text_message(alice.id, bob.id, "first");
        let second = text_message(bob.id, alice.id, "second");
        db.insert_message(&first).unwrap();
        db.insert_message(&second).unwrap();

        let outcome = db.pin_message(first.id, chat, alice.id, now()).unwrap();
        assert!(outcome.replaced.is_none());
        assert!(matches!(
            db.pin_message(first.id, chat, bob.id, now()),
            Err(StoreError::Duplicate)
        ));

        let outcome = db.pin_message(second.id, chat, bob.id, now()).unwrap();
        assert_eq!(outcome.replaced, Some(first.id));
        assert!(db.get_pin_for_message(first.id).unwrap().is_none());
        assert_eq!(
            db.pinned_message_for(ConversationKey::new(bob.id, alice.id))
                .unwrap()
                .map(|m| m.id),
            Some(second.id)
        );
    }

    #[test]
    fn deleting_message_removes_its_pin() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "Alice");
        let bob = add_user(&db, "Bob");
        let chat = ConversationKey::new(alice.id, bob.id);

        let msg = text_message(alice.id, bob.id, "pin me");
        db.insert_message(&msg).unwrap();
        db.pin_message(msg.id, chat, bob.id, now()).unwrap();

        assert!(db.delete_message(msg.id).unwrap());
        assert!(db.get_pin_for_message(msg.id).unwrap().is_none());
        assert!(db.pinned_message_for(chat).unwrap().is_none());
        assert_eq!(db.delete_pins_for_message(msg.id).unwrap(), 0);
    }
}
