//! Error types for airq-store.

use std::path::PathBuf;

/// Result type for airq-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in airq-store.
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

    /// Site not found in database.
    #[error("Site not found: {0}")]
    SiteNotFound(String),

    /// A stored unix timestamp is outside the representable range.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}
