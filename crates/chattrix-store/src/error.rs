use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// An insert hit a unique index or primary key.
    #[error("Record already exists")]
    Duplicate,

    /// A conditional update found the record already past the expected state.
    #[error("Record already resolved")]
    AlreadyResolved,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored value could not be decoded into its domain type.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// Classify a write error, turning unique-constraint hits into
    /// [`StoreError::Duplicate`].
    pub(crate) fn from_write(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return StoreError::Duplicate;
            }
        }
        StoreError::Sqlite(err)
    }

    /// Map a single-row query error, turning "no rows" into
    /// [`StoreError::NotFound`].
    pub(crate) fn from_query(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => StoreError::Sqlite(other),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
