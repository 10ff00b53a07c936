//! In-process fixtures: a full `AppState` on an in-memory database and a
//! temporary blob directory, plus fake live connections.

use chattrix_shared::{FriendRequestId, UserId};
use chattrix_store::{now, Database, User};
use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::blob_store::BlobStore;
use crate::config::ServerConfig;
use crate::events::ServerEvent;
use crate::presence::{ConnectionHandle, PresenceRegistry};
use crate::services::NewUser;
use crate::state::AppState;

pub const TEST_MAX_BLOB: usize = 1024;

pub struct TestApp {
    pub state: AppState,
    _blobs: TempDir,
}

pub async fn test_app() -> TestApp {
    test_app_with(ServerConfig::default()).await
}

pub async fn test_app_with(config: ServerConfig) -> TestApp {
    let blobs = TempDir::new().unwrap();
    let config = ServerConfig {
        blob_storage_path: blobs.path().to_path_buf(),
        max_blob_size: TEST_MAX_BLOB,
        public_base_url: "http://localhost:5001".into(),
        ..config
    };

    let blob_store = BlobStore::new(
        config.blob_storage_path.clone(),
        config.public_base_url.clone(),
        config.max_blob_size,
    )
    .await
    .unwrap();
    let db = Database::open_in_memory().unwrap();

    TestApp {
        state: AppState::new(db, blob_store, PresenceRegistry::new(), config),
        _blobs: blobs,
    }
}

impl TestApp {
    pub async fn add_user(&self, name: &str) -> User {
        self.state
            .relationships
            .upsert_user(NewUser {
                id: UserId::new(),
                email: format!("{}@example.com", name.to_lowercase()),
                full_name: name.to_string(),
                profile_pic: None,
            })
            .await
            .unwrap()
    }

    pub async fn befriend(&self, a: UserId, b: UserId) {
        let mut db = self.state.db.lock().await;
        let id = FriendRequestId::new();
        db.insert_friend_request(id, a, b, now()).unwrap();
        db.accept_friend_request(id, now()).unwrap();
    }

    /// Register a fake live connection for `user`.
    pub async fn connect(&self, user: UserId) -> mpsc::Receiver<ServerEvent> {
        let (handle, rx) = ConnectionHandle::channel(64);
        self.state.dispatcher.connect(user, handle).await;
        rx
    }
}

/// Next queued event that is not a presence update.
pub fn next_event(rx: &mut mpsc::Receiver<ServerEvent>) -> Option<ServerEvent> {
    while let Ok(event) = rx.try_recv() {
        if !matches!(event, ServerEvent::GetOnlineUsers(_)) {
            return Some(event);
        }
    }
    None
}
