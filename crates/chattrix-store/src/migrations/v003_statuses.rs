use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS statuses (
    id               TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    owner_id         TEXT NOT NULL,
    kind             TEXT NOT NULL CHECK (kind IN ('text', 'image', 'video')),
    content          TEXT NOT NULL,               -- text body or media URL
    background_color TEXT,                        -- text only
    caption          TEXT,                        -- media only
    expires_at       TEXT NOT NULL,
    created_at       TEXT NOT NULL,

    FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_statuses_owner_expiry ON statuses(owner_id, expires_at);
CREATE INDEX IF NOT EXISTS idx_statuses_expiry ON statuses(expires_at);

-- Composite key: a viewer is recorded at most once per status.
CREATE TABLE IF NOT EXISTS status_views (
    status_id TEXT NOT NULL,
    viewer_id TEXT NOT NULL,
    viewed_at TEXT NOT NULL,

    PRIMARY KEY (status_id, viewer_id),
    FOREIGN KEY (status_id) REFERENCES statuses(id) ON DELETE CASCADE,
    FOREIGN KEY (viewer_id) REFERENCES users(id) ON DELETE CASCADE
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
