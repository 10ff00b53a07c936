//! Database migration runner.
//!
//! Migrations are executed in order on every [`Database::open_at`] /
//! [`Database::open_in_memory`] call.  Each migration is guarded by a
//! `user_version` pragma so it runs exactly once.
//!
//! [`Database::open_at`]: crate::Database::open_at
//! [`Database::open_in_memory`]: crate::Database::open_in_memory

pub mod v001_relationships;
pub mod v002_messages;
pub mod v003_statuses;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.  Bump this and add a new migration module whenever
/// the schema changes.
pub const CURRENT_VERSION: u32 = 3;

type Migration = fn(&Connection) -> std::result::Result<(), rusqlite::Error>;

const MIGRATIONS: [(u32, &str, Migration); 3] = [
    (1, "v001_relationships", v001_relationships::up),
    (2, "v002_messages", v002_messages::up),
    (3, "v003_statuses", v003_statuses::up),
];

/// Run all pending migrations against the open connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::info!(
        current_version = current,
        target_version = CURRENT_VERSION,
        "checking database migrations"
    );

    for (version, name, up) in MIGRATIONS {
        if current < version {
            tracing::info!(migration = name, "applying migration");
            up(conn).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
            conn.pragma_update(None, "user_version", version)?;
        }
    }

    Ok(())
}
