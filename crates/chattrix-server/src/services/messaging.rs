//! Direct messages: send, read receipts, deletion, pins and unread counts.

use std::collections::HashMap;
use std::sync::Arc;

use chattrix_shared::{AttachmentKind, ConversationKey, MessageId, UserId};
use chattrix_store::{
    now, Attachment, ConversationSummary, Message, PinnedMessage, ReplySnapshot, StoreError,
};
use tracing::{info, warn};

use crate::blob_store::BlobStore;
use crate::dispatch::EventDispatcher;
use crate::error::{ServerError, ServerResult};
use crate::events::ServerEvent;
use crate::state::SharedDb;

/// Raw attachment bytes, uploaded before the message is stored.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub kind: AttachmentKind,
    pub data: Vec<u8>,
    pub document_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub text: Option<String>,
    pub attachment: Option<AttachmentUpload>,
    pub reply_to: Option<MessageId>,
}

#[derive(Clone)]
pub struct MessagingService {
    db: SharedDb,
    blob_store: Arc<BlobStore>,
    dispatcher: EventDispatcher,
}

impl MessagingService {
    pub fn new(db: SharedDb, blob_store: Arc<BlobStore>, dispatcher: EventDispatcher) -> Self {
        Self {
            db,
            blob_store,
            dispatcher,
        }
    }

    /// Persist a message and push it to the receiver.
    ///
    /// The attachment is uploaded first; if the upload fails nothing is
    /// stored. If storing fails after the upload, the blob is removed again.
    pub async fn send(
        &self,
        sender: UserId,
        receiver: UserId,
        outgoing: OutgoingMessage,
    ) -> ServerResult<Message> {
        if sender == receiver {
            return Err(ServerError::InvalidOperation(
                "Cannot send a message to yourself".into(),
            ));
        }
        let text = outgoing
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if text.is_none() && outgoing.attachment.is_none() {
            return Err(ServerError::InvalidOperation(
                "Message needs text or an attachment".into(),
            ));
        }

        let reply_to = {
            let db = self.db.lock().await;
            if !db.user_exists(receiver)? {
                return Err(ServerError::NotFound("User not found".into()));
            }
            if db.is_blocked_either(sender, receiver)? {
                return Err(ServerError::Forbidden("Cannot message this user".into()));
            }
            if !db.are_friends(sender, receiver)? {
                return Err(ServerError::Forbidden("You can only message friends".into()));
            }

            match outgoing.reply_to {
                Some(target_id) => {
                    let target = db.get_message(target_id).map_err(|e| match e {
                        StoreError::NotFound => {
                            ServerError::NotFound("Replied message not found".into())
                        }
                        other => other.into(),
                    })?;
                    if target.conversation() != ConversationKey::new(sender, receiver) {
                        return Err(ServerError::InvalidOperation(
                            "Cannot reply to a message from another conversation".into(),
                        ));
                    }
                    let author = db.get_user(target.sender_id)?;
                    Some(ReplySnapshot {
                        message_id: target.id,
                        text: target.text,
                        sender_name: author.full_name,
                    })
                }
                None => None,
            }
        };

        let attachment = match outgoing.attachment {
            Some(upload) => {
                let url = self
                    .blob_store
                    .upload(&upload.data, upload.kind, upload.kind.chat_folder())
                    .await?;
                Some(Attachment::new(upload.kind, url, upload.document_name))
            }
            None => None,
        };

        let message = Message {
            id: MessageId::new(),
            sender_id: sender,
            receiver_id: receiver,
            text,
            attachment,
            reply_to,
            is_read: false,
            read_at: None,
            created_at: now(),
        };

        let stored = self.db.lock().await.insert_message(&message);
        if let Err(e) = stored {
            if let Some(attachment) = &message.attachment {
                self.discard_blob(attachment).await;
            }
            return Err(e.into());
        }

        info!(message = %message.id, sender = %sender, receiver = %receiver, "Message sent");
        self.dispatcher
            .emit_to_user(receiver, ServerEvent::NewMessage(message.clone()))
            .await;
        Ok(message)
    }

    /// Every message between `user` and `peer`, oldest first.
    pub async fn conversation(&self, user: UserId, peer: UserId) -> ServerResult<Vec<Message>> {
        Ok(self.db.lock().await.list_conversation(user, peer)?)
    }

    /// Friends with their latest message, most recent conversation first.
    pub async fn sidebar(&self, user: UserId) -> ServerResult<Vec<ConversationSummary>> {
        let db = self.db.lock().await;
        let mut summaries = Vec::new();
        for friend in db.list_friends(user)? {
            let last_message = db.last_message_between(user, friend.id)?;
            summaries.push(ConversationSummary {
                user: friend,
                last_message,
            });
        }
        drop(db);

        summaries.sort_by(|a, b| {
            let at = |s: &ConversationSummary| s.last_message.as_ref().map(|m| m.created_at);
            at(b).cmp(&at(a))
        });
        Ok(summaries)
    }

    /// Unread counts addressed to `user`, keyed by sender.
    pub async fn unread_counts(&self, user: UserId) -> ServerResult<HashMap<UserId, u64>> {
        Ok(self.db.lock().await.unread_counts(user)?)
    }

    /// Mark everything `sender` sent to `reader` as read. Returns how many
    /// messages changed; the receipt is only pushed when that is non-zero.
    pub async fn mark_read(&self, reader: UserId, sender: UserId) -> ServerResult<usize> {
        let changed = self
            .db
            .lock()
            .await
            .mark_conversation_read(reader, sender, now())?;

        if changed > 0 {
            self.dispatcher
                .emit_to_user(
                    sender,
                    ServerEvent::MessagesRead {
                        read_by: reader,
                        sender_id: sender,
                    },
                )
                .await;
        }
        Ok(changed)
    }

    /// Delete for everyone. Only the sender may do this.
    pub async fn delete(&self, message_id: MessageId, actor: UserId) -> ServerResult<()> {
        let message = self.load(message_id).await?;
        if message.sender_id != actor {
            return Err(ServerError::Forbidden(
                "Only the sender can delete this message".into(),
            ));
        }

        if let Some(attachment) = &message.attachment {
            self.discard_blob(attachment).await;
        }

        {
            let db = self.db.lock().await;
            if let Err(e) = db.delete_pins_for_message(message_id) {
                warn!(message = %message_id, error = %e, "Failed to remove pins of deleted message");
            }
            db.delete_message(message_id)?;
        }

        info!(message = %message_id, actor = %actor, "Message deleted");
        self.dispatcher
            .emit_to_user(
                message.receiver_id,
                ServerEvent::MessageDeleted { message_id },
            )
            .await;
        Ok(())
    }

    /// Pin a message for the conversation between `actor` and `chat_user`.
    /// Replaces whatever was pinned there before.
    pub async fn pin(
        &self,
        message_id: MessageId,
        actor: UserId,
        chat_user: UserId,
    ) -> ServerResult<PinnedMessage> {
        let message = self.load(message_id).await?;
        if !message.is_participant(actor) {
            return Err(ServerError::Forbidden("Not part of this conversation".into()));
        }
        if message.other_party(actor) != Some(chat_user) {
            return Err(ServerError::InvalidOperation(
                "Message does not belong to this chat".into(),
            ));
        }

        let outcome = self
            .db
            .lock()
            .await
            .pin_message(message_id, message.conversation(), actor, now())
            .map_err(|e| match e {
                StoreError::Duplicate => ServerError::Conflict("Message already pinned".into()),
                other => other.into(),
            })?;

        info!(message = %message_id, actor = %actor, "Message pinned");
        if let Some(replaced) = outcome.replaced {
            self.dispatcher
                .emit_to_user(
                    chat_user,
                    ServerEvent::MessageUnpinned {
                        message_id: replaced,
                    },
                )
                .await;
        }
        self.dispatcher
            .emit_to_user(chat_user, ServerEvent::MessagePinned { message_id, message })
            .await;
        Ok(outcome.pin)
    }

    pub async fn unpin(&self, message_id: MessageId, actor: UserId) -> ServerResult<()> {
        let message = {
            let db = self.db.lock().await;
            if db.get_pin_for_message(message_id)?.is_none() {
                return Err(ServerError::NotFound("Pinned message not found".into()));
            }
            let message = db.get_message(message_id)?;
            if !message.is_participant(actor) {
                return Err(ServerError::Forbidden("Not part of this conversation".into()));
            }
            db.delete_pins_for_message(message_id)?;
            message
        };

        info!(message = %message_id, actor = %actor, "Message unpinned");
        if let Some(other) = message.other_party(actor) {
            self.dispatcher
                .emit_to_user(other, ServerEvent::MessageUnpinned { message_id })
                .await;
        }
        Ok(())
    }

    /// The pinned message of the conversation with `peer`, if any.
    pub async fn pinned(&self, user: UserId, peer: UserId) -> ServerResult<Vec<Message>> {
        let pinned = self
            .db
            .lock()
            .await
            .pinned_message_for(ConversationKey::new(user, peer))?;
        Ok(pinned.into_iter().collect())
    }

    async fn load(&self, message_id: MessageId) -> ServerResult<Message> {
        self.db
            .lock()
            .await
            .get_message(message_id)
            .map_err(|e| match e {
                StoreError::NotFound => ServerError::NotFound("Message not found".into()),
                other => other.into(),
            })
    }

    async fn discard_blob(&self, attachment: &Attachment) {
        if let Err(e) = self
            .blob_store
            .delete(attachment.url(), attachment.kind())
            .await
        {
            warn!(url = attachment.url(), error = %e, "Failed to delete attachment blob");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{next_event, test_app, TestApp, TEST_MAX_BLOB};
    use chattrix_store::User;

    fn text(body: &str) -> OutgoingMessage {
        OutgoingMessage {
            text: Some(body.to_string()),
            ..Default::default()
        }
    }

    async fn friends(app: &TestApp) -> (User, User) {
        let alice = app.add_user("Alice").await;
        let bob = app.add_user("Bob").await;
        app.befriend(alice.id, bob.id).await;
        (alice, bob)
    }

    #[tokio::test]
    async fn test_new_message_then_read_receipt() {
        let app = test_app().await;
        let (alice, bob) = friends(&app).await;
        let messaging = &app.state.messaging;
        let mut alice_rx = app.connect(alice.id).await;
        let mut bob_rx = app.connect(bob.id).await;

        let sent = messaging.send(alice.id, bob.id, text("hi")).await.unwrap();
        match next_event(&mut bob_rx) {
            Some(ServerEvent::NewMessage(m)) => {
                assert_eq!(m.id, sent.id);
                assert_eq!(m.text.as_deref(), Some("hi"));
                assert_eq!(m.sender_id, alice.id);
                assert!(!m.is_read);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        // The sender gets the message back from the call, not the channel.
        assert!(next_event(&mut alice_rx).is_none());

        assert_eq!(
            messaging.unread_counts(bob.id).await.unwrap().get(&alice.id),
            Some(&1)
        );

        assert_eq!(messaging.mark_read(bob.id, alice.id).await.unwrap(), 1);
        assert!(matches!(
            next_event(&mut alice_rx),
            Some(ServerEvent::MessagesRead { read_by, sender_id })
                if read_by == bob.id && sender_id == alice.id
        ));

        // Second call changes nothing and pushes nothing.
        assert_eq!(messaging.mark_read(bob.id, alice.id).await.unwrap(), 0);
        assert!(next_event(&mut alice_rx).is_none());

        let history = messaging.conversation(alice.id, bob.id).await.unwrap();
        assert!(history.iter().all(|m| m.is_read && m.read_at.is_some()));
        assert!(messaging.unread_counts(bob.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blocked_either_way_cannot_message() {
        let app = test_app().await;
        let (alice, bob) = friends(&app).await;
        app.state.relationships.block(alice.id, bob.id).await.unwrap();

        let messaging = &app.state.messaging;
        assert!(matches!(
            messaging.send(bob.id, alice.id, text("hey")).await,
            Err(ServerError::Forbidden(_))
        ));
        assert!(matches!(
            messaging.send(alice.id, bob.id, text("hey")).await,
            Err(ServerError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_send_validation() {
        let app = test_app().await;
        let (alice, bob) = friends(&app).await;
        let carol = app.add_user("Carol").await;
        let messaging = &app.state.messaging;

        assert!(matches!(
            messaging.send(alice.id, alice.id, text("me")).await,
            Err(ServerError::InvalidOperation(_))
        ));
        assert!(matches!(
            messaging.send(alice.id, bob.id, text("   ")).await,
            Err(ServerError::InvalidOperation(_))
        ));
        assert!(matches!(
            messaging.send(alice.id, carol.id, text("stranger")).await,
            Err(ServerError::Forbidden(_))
        ));
        assert!(matches!(
            messaging.send(alice.id, UserId::new(), text("ghost")).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_upload_stores_nothing() {
        let app = test_app().await;
        let (alice, bob) = friends(&app).await;
        let messaging = &app.state.messaging;
        let mut bob_rx = app.connect(bob.id).await;

        let outgoing = OutgoingMessage {
            text: Some("big video".into()),
            attachment: Some(AttachmentUpload {
                kind: AttachmentKind::Video,
                data: vec![0u8; TEST_MAX_BLOB + 1],
                document_name: None,
            }),
            reply_to: None,
        };
        assert!(matches!(
            messaging.send(alice.id, bob.id, outgoing).await,
            Err(ServerError::BlobTooLarge { .. })
        ));
        assert!(messaging.conversation(alice.id, bob.id).await.unwrap().is_empty());
        assert!(next_event(&mut bob_rx).is_none());
    }

    #[tokio::test]
    async fn test_reply_snapshot_survives_original_deletion() {
        let app = test_app().await;
        let (alice, bob) = friends(&app).await;
        let messaging = &app.state.messaging;

        let original = messaging.send(alice.id, bob.id, text("lunch?")).await.unwrap();
        let reply = messaging
            .send(
                bob.id,
                alice.id,
                OutgoingMessage {
                    reply_to: Some(original.id),
                    ..text("sure")
                },
            )
            .await
            .unwrap();

        let snapshot = reply.reply_to.clone().unwrap();
        assert_eq!(snapshot.message_id, original.id);
        assert_eq!(snapshot.text.as_deref(), Some("lunch?"));
        assert_eq!(snapshot.sender_name, "Alice");

        messaging.delete(original.id, alice.id).await.unwrap();
        let history = messaging.conversation(alice.id, bob.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reply_to, Some(snapshot));
    }

    #[tokio::test]
    async fn test_reply_must_stay_in_conversation() {
        let app = test_app().await;
        let (alice, bob) = friends(&app).await;
        let carol = app.add_user("Carol").await;
        app.befriend(alice.id, carol.id).await;
        let messaging = &app.state.messaging;

        let elsewhere = messaging.send(alice.id, carol.id, text("secret")).await.unwrap();
        assert!(matches!(
            messaging
                .send(
                    bob.id,
                    alice.id,
                    OutgoingMessage {
                        reply_to: Some(elsewhere.id),
                        ..text("what?")
                    }
                )
                .await,
            Err(ServerError::InvalidOperation(_))
        ));
        assert!(matches!(
            messaging
                .send(
                    bob.id,
                    alice.id,
                    OutgoingMessage {
                        reply_to: Some(MessageId::new()),
                        ..text("what?")
                    }
                )
                .await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades_pin_and_blob() {
        let app = test_app().await;
        let (alice, bob) = friends(&app).await;
        let messaging = &app.state.messaging;
        let mut bob_rx = app.connect(bob.id).await;

        let sent = messaging
            .send(
                alice.id,
                bob.id,
                OutgoingMessage {
                    text: None,
                    attachment: Some(AttachmentUpload {
                        kind: AttachmentKind::Document,
                        data: b"minutes".to_vec(),
                        document_name: Some("minutes.txt".into()),
                    }),
                    reply_to: None,
                },
            )
            .await
            .unwrap();
        let attachment = sent.attachment.clone().unwrap();
        assert_eq!(attachment.document_name(), Some("minutes.txt"));
        messaging.pin(sent.id, bob.id, alice.id).await.unwrap();
        while next_event(&mut bob_rx).is_some() {}

        // Only the sender may delete.
        assert!(matches!(
            messaging.delete(sent.id, bob.id).await,
            Err(ServerError::Forbidden(_))
        ));
        assert_eq!(messaging.conversation(alice.id, bob.id).await.unwrap().len(), 1);

        messaging.delete(sent.id, alice.id).await.unwrap();
        assert!(matches!(
            next_event(&mut bob_rx),
            Some(ServerEvent::MessageDeleted { message_id }) if message_id == sent.id
        ));
        assert!(messaging.conversation(alice.id, bob.id).await.unwrap().is_empty());
        assert!(messaging.pinned(alice.id, bob.id).await.unwrap().is_empty());

        let name = attachment.url().rsplit('/').next().unwrap();
        assert!(app
            .state
            .blob_store
            .get(AttachmentKind::Document.chat_folder(), name)
            .await
            .is_err());

        assert!(matches!(
            messaging.delete(sent.id, alice.id).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pin_replace_and_unpin() {
        let app = test_app().await;
        let (alice, bob) = friends(&app).await;
        let messaging = &app.state.messaging;
        let mut bob_rx = app.connect(bob.id).await;

        let first = messaging.send(alice.id, bob.id, text("one")).await.unwrap();
        let second = messaging.send(bob.id, alice.id, text("two")).await.unwrap();
        while next_event(&mut bob_rx).is_some() {}

        messaging.pin(first.id, alice.id, bob.id).await.unwrap();
        assert!(matches!(
            next_event(&mut bob_rx),
            Some(ServerEvent::MessagePinned { message_id, .. }) if message_id == first.id
        ));
        assert!(matches!(
            messaging.pin(first.id, bob.id, alice.id).await,
            Err(ServerError::Conflict(_))
        ));

        messaging.pin(second.id, alice.id, bob.id).await.unwrap();
        assert!(matches!(
            next_event(&mut bob_rx),
            Some(ServerEvent::MessageUnpinned { message_id }) if message_id == first.id
        ));
        assert!(matches!(
            next_event(&mut bob_rx),
            Some(ServerEvent::MessagePinned { message_id, .. }) if message_id == second.id
        ));
        let pinned = messaging.pinned(bob.id, alice.id).await.unwrap();
        assert_eq!(pinned.iter().map(|m| m.id).collect::<Vec<_>>(), vec![second.id]);

        messaging.unpin(second.id, alice.id).await.unwrap();
        assert!(matches!(
            next_event(&mut bob_rx),
            Some(ServerEvent::MessageUnpinned { message_id }) if message_id == second.id
        ));
        assert!(matches!(
            messaging.unpin(second.id, alice.id).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pin_requires_participant() {
        let app = test_app().await;
        let (alice, bob) = friends(&app).await;
        let carol = app.add_user("Carol").await;
        let messaging = &app.state.messaging;

        let sent = messaging.send(alice.id, bob.id, text("ours")).await.unwrap();
        assert!(matches!(
            messaging.pin(sent.id, carol.id, alice.id).await,
            Err(ServerError::Forbidden(_))
        ));
        assert!(matches!(
            messaging.pin(sent.id, alice.id, carol.id).await,
            Err(ServerError::InvalidOperation(_))
        ));
        assert!(matches!(
            messaging.pin(MessageId::new(), alice.id, bob.id).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sidebar_orders_by_latest_message() {
        let app = test_app().await;
        let (alice, bob) = friends(&app).await;
        let carol = app.add_user("Carol").await;
        let dave = app.add_user("Dave").await;
        app.befriend(alice.id, carol.id).await;
        app.befriend(alice.id, dave.id).await;
        let messaging = &app.state.messaging;

        messaging.send(alice.id, bob.id, text("to bob")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        messaging.send(carol.id, alice.id, text("from carol")).await.unwrap();

        let sidebar = messaging.sidebar(alice.id).await.unwrap();
        let order: Vec<_> = sidebar.iter().map(|s| s.user.id).collect();
        assert_eq!(order, vec![carol.id, bob.id, dave.id]);
        assert!(sidebar[2].last_message.is_none());
    }
}
