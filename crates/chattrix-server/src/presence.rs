//! Process-wide registry of live connections.
//!
//! A user has at most one live connection. A later connect replaces the
//! earlier handle, which drops its sender and ends the old socket loop.

use std::collections::HashMap;
use std::sync::Arc;

use chattrix_shared::UserId;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::events::ServerEvent;

/// Outbound half of a live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: Uuid,
    tx: mpsc::Sender<ServerEvent>,
}

/// Why a push did not reach its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Outbound queue is full; the client is not keeping up.
    Full,
    /// The socket task has gone away.
    Closed,
}

impl ConnectionHandle {
    /// New handle with a bounded outbound queue of `buffer` events.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    /// Queue an event without waiting.
    pub fn push(&self, event: ServerEvent) -> Result<(), PushError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PushError::Full,
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
        })
    }
}

#[derive(Debug, Default)]
struct Inner {
    by_user: HashMap<UserId, ConnectionHandle>,
    by_conn: HashMap<Uuid, UserId>,
}

#[derive(Debug, Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` as the live connection of `user`, replacing any
    /// previous one (last write wins).
    pub async fn connect(&self, user: UserId, handle: ConnectionHandle) {
        let mut inner = self.inner.write().await;
        let conn_id = handle.id;

        if let Some(previous) = inner.by_user.insert(user, handle) {
            inner.by_conn.remove(&previous.id);
            debug!(user = %user, old_conn = %previous.id, "Replaced live connection");
        }
        inner.by_conn.insert(conn_id, user);

        info!(user = %user, conn = %conn_id, online = inner.by_user.len(), "User connected");
    }

    /// Drop the connection `conn_id`. The user's entry is only removed if
    /// this connection is still the current one, so a stale disconnect
    /// racing a reconnect leaves the new connection in place.
    ///
    /// Returns the user whose entry was removed.
    pub async fn disconnect(&self, conn_id: Uuid) -> Option<UserId> {
        let mut inner = self.inner.write().await;
        let user = inner.by_conn.remove(&conn_id)?;

        let is_current = inner
            .by_user
            .get(&user)
            .map(|handle| handle.id == conn_id)
            .unwrap_or(false);
        if !is_current {
            debug!(user = %user, conn = %conn_id, "Ignoring stale disconnect");
            return None;
        }

        inner.by_user.remove(&user);
        info!(user = %user, conn = %conn_id, online = inner.by_user.len(), "User disconnected");
        Some(user)
    }

    pub async fn lookup(&self, user: UserId) -> Option<ConnectionHandle> {
        self.inner.read().await.by_user.get(&user).cloned()
    }

    /// Online user ids, sorted.
    pub async fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.inner.read().await.by_user.keys().copied().collect();
        users.sort();
        users
    }

    pub async fn all(&self) -> Vec<(UserId, ConnectionHandle)> {
        self.inner
            .read()
            .await
            .by_user
            .iter()
            .map(|(user, handle)| (*user, handle.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_user.len()
    }

    /// Forget every connection. Called at shutdown; dropping the senders ends
    /// the socket loops.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        let count = inner.by_user.len();
        inner.by_user.clear();
        inner.by_conn.clear();
        info!(count, "Cleared presence registry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let registry = PresenceRegistry::new();
        let alice = UserId::new();
        let (handle, _rx) = ConnectionHandle::channel(4);
        let conn = handle.id;

        registry.connect(alice, handle).await;
        assert!(registry.lookup(alice).await.is_some());
        assert_eq!(registry.online_users().await, vec![alice]);

        assert_eq!(registry.disconnect(conn).await, Some(alice));
        assert!(registry.lookup(alice).await.is_none());
        assert_eq!(registry.disconnect(conn).await, None);
    }

    #[tokio::test]
    async fn test_stale_disconnect_keeps_new_connection() {
        let registry = PresenceRegistry::new();
        let alice = UserId::new();

        let (first, mut first_rx) = ConnectionHandle::channel(4);
        let (second, _second_rx) = ConnectionHandle::channel(4);
        let (first_id, second_id) = (first.id, second.id);

        registry.connect(alice, first).await;
        registry.connect(alice, second).await;

        // The replaced sender is gone, so the old receiver sees the end.
        assert!(first_rx.recv().await.is_none());

        assert_eq!(registry.disconnect(first_id).await, None);
        assert_eq!(registry.lookup(alice).await.map(|h| h.id), Some(second_id));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_push_reports_full_and_closed() {
        let (handle, rx) = ConnectionHandle::channel(1);
        assert!(handle.push(ServerEvent::GetOnlineUsers(vec![])).is_ok());
        assert_eq!(
            handle.push(ServerEvent::GetOnlineUsers(vec![])),
            Err(PushError::Full)
        );
        drop(rx);
        assert_eq!(
            handle.push(ServerEvent::GetOnlineUsers(vec![])),
            Err(PushError::Closed)
        );
    }

    #[tokio::test]
    async fn test_clear() {
        let registry = PresenceRegistry::new();
        let (handle, _rx) = ConnectionHandle::channel(4);
        registry.connect(UserId::new(), handle).await;
        registry.clear().await;
        assert_eq!(registry.len().await, 0);
    }
}
