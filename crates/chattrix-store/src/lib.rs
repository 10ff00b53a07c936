//! # chattrix-store
//!
//! Persistent storage for the Chattrix server, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model: users and their relationship graph, friend requests, direct
//! messages, pins and statuses.
//!
//! Uniqueness rules that must hold under concurrent callers (one friend
//! request per pair, one pin per conversation, one view per viewer) are
//! enforced by indexes in the schema rather than by read-then-write checks.

pub mod database;
pub mod friend_requests;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod pins;
pub mod statuses;
pub mod users;

mod codec;
mod error;

pub use codec::now;
pub use database::Database;
pub use error::StoreError;
pub use models::*;
