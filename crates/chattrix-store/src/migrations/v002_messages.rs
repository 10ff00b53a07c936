//! v002 -- Direct messages and pins.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id                TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    sender_id         TEXT NOT NULL,
    receiver_id       TEXT NOT NULL,
    text              TEXT,
    attachment_kind   TEXT CHECK (attachment_kind IN ('image', 'video', 'audio', 'document')),
    attachment_url    TEXT,
    document_name     TEXT,
    reply_message_id  TEXT,                       -- snapshot, not a foreign key
    reply_text        TEXT,
    reply_sender_name TEXT,
    is_read           INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    read_at           TEXT,
    created_at        TEXT NOT NULL,

    CHECK ((attachment_kind IS NULL) = (attachment_url IS NULL)),
    FOREIGN KEY (sender_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (receiver_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_pair
    ON messages(sender_id, receiver_id, created_at);
CREATE INDEX IF NOT EXISTS idx_messages_unread
    ON messages(receiver_id, is_read);

-- One pin per conversation (unordered pair).
CREATE TABLE IF NOT EXISTS pinned_messages (
    id         TEXT PRIMARY KEY NOT NULL,         -- UUID v4
    message_id TEXT NOT NULL,
    pair_low   TEXT NOT NULL,
    pair_high  TEXT NOT NULL,
    pinned_by  TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_pinned_messages_pair
    ON pinned_messages(pair_low, pair_high);
CREATE INDEX IF NOT EXISTS idx_pinned_messages_message
    ON pinned_messages(message_id);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
