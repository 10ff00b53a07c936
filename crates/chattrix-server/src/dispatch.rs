//! Routes domain events to live connections.
//!
//! Delivery is at-most-once and best effort: an event for an offline user,
//! or for a connection whose queue is full, is dropped and never retried.
//! Clients reconcile by re-fetching state when they reconnect.

use chattrix_shared::UserId;
use tracing::debug;
use uuid::Uuid;

use crate::events::ServerEvent;
use crate::presence::{ConnectionHandle, PresenceRegistry};

#[derive(Debug, Clone)]
pub struct EventDispatcher {
    presence: PresenceRegistry,
}

impl EventDispatcher {
    pub fn new(presence: PresenceRegistry) -> Self {
        Self { presence }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Register a live connection and tell everyone who is online.
    pub async fn connect(&self, user: UserId, handle: ConnectionHandle) {
        self.presence.connect(user, handle).await;
        self.broadcast_online_users().await;
    }

    /// Remove a live connection. The online list is rebroadcast only when the
    /// registry actually changed.
    pub async fn disconnect(&self, conn_id: Uuid) -> Option<UserId> {
        let removed = self.presence.disconnect(conn_id).await;
        if removed.is_some() {
            self.broadcast_online_users().await;
        }
        removed
    }

    /// Push to one user. Returns whether the event was queued.
    pub async fn emit_to_user(&self, user: UserId, event: ServerEvent) -> bool {
        let Some(handle) = self.presence.lookup(user).await else {
            debug!(user = %user, event = event.name(), "Target offline, dropping event");
            return false;
        };

        let name = event.name();
        match handle.push(event) {
            Ok(()) => true,
            Err(reason) => {
                debug!(user = %user, event = name, ?reason, "Dropping event for connection");
                false
            }
        }
    }

    pub async fn emit_to_users(&self, users: &[UserId], event: ServerEvent) -> usize {
        let mut delivered = 0;
        for user in users {
            if self.emit_to_user(*user, event.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Push to every live connection.
    pub async fn emit_to_all(&self, event: ServerEvent) -> usize {
        let mut delivered = 0;
        for (user, handle) in self.presence.all().await {
            match handle.push(event.clone()) {
                Ok(()) => delivered += 1,
                Err(reason) => {
                    debug!(user = %user, event = event.name(), ?reason, "Dropping broadcast for connection");
                }
            }
        }
        delivered
    }

    async fn broadcast_online_users(&self) {
        let online = self.presence.online_users().await;
        self.emit_to_all(ServerEvent::GetOnlineUsers(online)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chattrix_shared::MessageId;

    fn deleted() -> ServerEvent {
        ServerEvent::MessageDeleted {
            message_id: MessageId::new(),
        }
    }

    #[tokio::test]
    async fn test_connect_broadcasts_online_list() {
        let dispatcher = EventDispatcher::new(PresenceRegistry::new());
        let alice = UserId::new();
        let bob = UserId::new();

        let (a, mut a_rx) = ConnectionHandle::channel(8);
        dispatcher.connect(alice, a).await;
        let (b, mut b_rx) = ConnectionHandle::channel(8);
        dispatcher.connect(bob, b).await;

        // Alice sees herself, then both of them.
        assert!(matches!(a_rx.recv().await, Some(ServerEvent::GetOnlineUsers(u)) if u == vec![alice]));
        match a_rx.recv().await {
            Some(ServerEvent::GetOnlineUsers(users)) => {
                assert_eq!(users.len(), 2);
                assert!(users.contains(&bob));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(b_rx.recv().await, Some(ServerEvent::GetOnlineUsers(u)) if u.len() == 2));
    }

    #[tokio::test]
    async fn test_emit_to_offline_user_is_dropped() {
        let dispatcher = EventDispatcher::new(PresenceRegistry::new());
        assert!(!dispatcher.emit_to_user(UserId::new(), deleted()).await);
    }

    #[tokio::test]
    async fn test_full_queue_does_not_block() {
        let dispatcher = EventDispatcher::new(PresenceRegistry::new());
        let alice = UserId::new();
        let (handle, _rx) = ConnectionHandle::channel(1);

        // The connect broadcast fills the single slot.
        dispatcher.connect(alice, handle).await;
        assert!(!dispatcher.emit_to_user(alice, deleted()).await);
        assert_eq!(dispatcher.emit_to_all(deleted()).await, 0);
    }

    #[tokio::test]
    async fn test_stale_disconnect_does_not_rebroadcast() {
        let dispatcher = EventDispatcher::new(PresenceRegistry::new());
        let alice = UserId::new();
        let bob = UserId::new();

        let (b, mut b_rx) = ConnectionHandle::channel(8);
        dispatcher.connect(bob, b).await;
        let (old, _old_rx) = ConnectionHandle::channel(8);
        let old_id = old.id;
        dispatcher.connect(alice, old).await;
        let (new, _new_rx) = ConnectionHandle::channel(8);
        dispatcher.connect(alice, new).await;

        while b_rx.try_recv().is_ok() {}

        assert_eq!(dispatcher.disconnect(old_id).await, None);
        assert!(b_rx.try_recv().is_err());
        assert!(dispatcher.presence().lookup(alice).await.is_some());
    }
}
