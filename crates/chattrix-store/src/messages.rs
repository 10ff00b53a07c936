use std::collections::HashMap;

use chattrix_shared::{AttachmentKind, MessageId, UserId};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::codec::{fmt_ts, get_opt_ts, get_ts, get_uuid};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Attachment, Message, ReplySnapshot};

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, text, attachment_kind, attachment_url,
     document_name, reply_message_id, reply_text, reply_sender_name, is_read, read_at, created_at";

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        let attachment = message.attachment.as_ref();
        let reply = message.reply_to.as_ref();

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO messages ({MESSAGE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    message.id.to_string(),
                    message.sender_id.to_string(),
                    message.receiver_id.to_string(),
                    message.text,
                    attachment.map(|a| a.kind().as_str()),
                    attachment.map(|a| a.url()),
                    attachment.and_then(|a| a.document_name()),
                    reply.map(|r| r.message_id.to_string()),
                    reply.and_then(|r| r.text.as_deref()),
                    reply.map(|r| r.sender_name.as_str()),
                    message.is_read as i32,
                    message.read_at.as_ref().map(fmt_ts),
                    fmt_ts(&message.created_at),
                ],
            )
            .map_err(StoreError::from_write)?;
        Ok(())
    }

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(StoreError::from_query)
    }

    /// Every message exchanged between `a` and `b`, in insertion order.
    pub fn list_conversation(&self, a: UserId, b: UserId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY created_at ASC, rowid ASC"
        ))?;

        let rows = stmt.query_map(params![a.to_string(), b.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn last_message_between(&self, a: UserId, b: UserId) -> Result<Option<Message>> {
        let message = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE (sender_id = ?1 AND receiver_id = ?2)
                        OR (sender_id = ?2 AND receiver_id = ?1)
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT 1"
                ),
                params![a.to_string(), b.to_string()],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    /// Flip every unread message from `sender` to `receiver` to read.
    /// Returns how many messages changed; zero when nothing was unread.
    pub fn mark_conversation_read(
        &self,
        receiver: UserId,
        sender: UserId,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET is_read = 1, read_at = ?3
             WHERE receiver_id = ?1 AND sender_id = ?2 AND is_read = 0",
            params![receiver.to_string(), sender.to_string(), fmt_ts(&now)],
        )?;
        Ok(affected)
    }

    /// Unread message counts addressed to `receiver`, keyed by sender.
    pub fn unread_counts(&self, receiver: UserId) -> Result<HashMap<UserId, u64>> {
        let mut stmt = self.conn().prepare(
            "SELECT sender_id, COUNT(*) FROM messages
             WHERE receiver_id = ?1 AND is_read = 0
             GROUP BY sender_id",
        )?;

        let rows = stmt.query_map(params![receiver.to_string()], |row| {
            let sender = UserId(get_uuid(row, 0)?);
            let count: i64 = row.get(1)?;
            Ok((sender, count as u64))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (sender, count) = row?;
            counts.insert(sender, count);
        }
        Ok(counts)
    }

    /// Hard-delete a message. Pins on it go with it through the foreign key.
    pub fn delete_message(&self, id: MessageId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM messages WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let kind: Option<String> = row.get(4)?;
    let url: Option<String> = row.get(5)?;
    let document_name: Option<String> = row.get(6)?;

    let attachment = match (kind, url) {
        (Some(kind), Some(url)) => {
            let kind = kind.parse::<AttachmentKind>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
            })?;
            Some(Attachment::new(kind, url, document_name))
        }
        _ => None,
    };

    let reply_id: Option<String> = row.get(7)?;
    let reply_to = match reply_id {
        Some(raw) => {
            let message_id = raw.parse::<MessageId>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
            })?;
            Some(ReplySnapshot {
                message_id,
                text: row.get(8)?,
                sender_name: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
            })
        }
        None => None,
    };

    let is_read: i32 = row.get(10)?;

    Ok(Message {
        id: MessageId(get_uuid(row, 0)?),
        sender_id: UserId(get_uuid(row, 1)?),
        receiver_id: UserId(get_uuid(row, 2)?),
        text: row.get(3)?,
        attachment,
        reply_to,
        is_read: is_read != 0,
        read_at: get_opt_ts(row, 11)?,
        created_at: get_ts(row, 12)?,
    })
}
