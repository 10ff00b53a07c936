use std::sync::Arc;

use chattrix_store::Database;
use tokio::sync::Mutex;

use crate::blob_store::BlobStore;
use crate::config::ServerConfig;
use crate::dispatch::EventDispatcher;
use crate::presence::PresenceRegistry;
use crate::services::{MessagingService, RelationshipService, StatusService};

/// The SQLite handle shared by every service. Writes are serialized through
/// this lock; the guard is never held across blob I/O or event pushes.
pub type SharedDb = Arc<Mutex<Database>>;

#[derive(Clone)]
pub struct AppState {
    pub db: SharedDb,
    pub blob_store: Arc<BlobStore>,
    pub dispatcher: EventDispatcher,
    pub relationships: RelationshipService,
    pub messaging: MessagingService,
    pub statuses: StatusService,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        db: Database,
        blob_store: BlobStore,
        presence: PresenceRegistry,
        config: ServerConfig,
    ) -> Self {
        let db: SharedDb = Arc::new(Mutex::new(db));
        let blob_store = Arc::new(blob_store);
        let dispatcher = EventDispatcher::new(presence);

        Self {
            relationships: RelationshipService::new(db.clone(), dispatcher.clone()),
            messaging: MessagingService::new(db.clone(), blob_store.clone(), dispatcher.clone()),
            statuses: StatusService::new(
                db.clone(),
                blob_store.clone(),
                dispatcher.clone(),
                config.status_audience,
            ),
            db,
            blob_store,
            dispatcher,
            config: Arc::new(config),
        }
    }
}
