//! v001 -- Users and the relationship graph.
//!
//! Friendships are stored as two directed rows so "friends of X" is a single
//! indexed lookup.  Friend requests carry the unordered pair in
//! `pair_low`/`pair_high`; the unique index on it is what prevents two
//! concurrent requests between the same users.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id          TEXT PRIMARY KEY NOT NULL,   -- UUID issued by the auth service
    email       TEXT NOT NULL UNIQUE,        -- trimmed, lower-cased
    full_name   TEXT NOT NULL,
    profile_pic TEXT,                        -- blob URL
    created_at  TEXT NOT NULL                -- RFC-3339, microseconds, UTC
);

-- ----------------------------------------------------------------
-- Friendships (one row per direction)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friendships (
    user_id    TEXT NOT NULL,
    friend_id  TEXT NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (user_id, friend_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (friend_id) REFERENCES users(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Blocks (directed: blocker -> blocked)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS blocks (
    blocker_id TEXT NOT NULL,
    blocked_id TEXT NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (blocker_id, blocked_id),
    FOREIGN KEY (blocker_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (blocked_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_blocks_blocked ON blocks(blocked_id);

-- ----------------------------------------------------------------
-- Friend requests
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friend_requests (
    id          TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    sender_id   TEXT NOT NULL,
    receiver_id TEXT NOT NULL,
    pair_low    TEXT NOT NULL,               -- min(sender_id, receiver_id)
    pair_high   TEXT NOT NULL,               -- max(sender_id, receiver_id)
    status      TEXT NOT NULL CHECK (status IN ('pending', 'accepted')),
    created_at  TEXT NOT NULL,

    FOREIGN KEY (sender_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (receiver_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_friend_requests_pair
    ON friend_requests(pair_low, pair_high);
CREATE INDEX IF NOT EXISTS idx_friend_requests_receiver
    ON friend_requests(receiver_id, status);
CREATE INDEX IF NOT EXISTS idx_friend_requests_sender
    ON friend_requests(sender_id, status);
"#;

/// Apply the relationship schema.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
