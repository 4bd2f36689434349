//! Error types for geotrack-store.

use std::path::PathBuf;

/// Result type for geotrack-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in geotrack-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A batch append stopped part way through.
    ///
    /// Rows before `failed_index` were committed and their ids are in
    /// `inserted`; nothing after it was attempted.
    #[error("Batch append failed at row {failed_index} after {} row(s) were stored: {source}", inserted.len())]
    PartialBatch {
        inserted: Vec<i64>,
        failed_index: usize,
        source: Box<Error>,
    },

    /// The persisted device identity could not be read or written.
    #[error("Device identity error at {path}: {source}")]
    Identity {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The database was written by a newer build.
    #[error("Database schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: i32, supported: i32 },
}
