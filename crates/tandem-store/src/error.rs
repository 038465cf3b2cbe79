use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0} already exists")]
    Conflict(&'static str),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored enum or identifier could not be decoded.
    #[error("Decode error: {0}")]
    Parse(#[from] tandem_shared::ParseError),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),
}

impl StoreError {
    /// Map `QueryReturnedNoRows` to [`StoreError::NotFound`].
    pub(crate) fn from_query(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => StoreError::Sqlite(other),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
