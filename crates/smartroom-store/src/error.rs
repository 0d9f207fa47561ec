//! Error types for smartroom-store.

use std::path::PathBuf;

/// Result type for smartroom-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in smartroom-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite, including constraint violations.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A stored timestamp is outside the representable range.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}

impl Error {
    /// Whether the failure was a constraint violation rather than a connectivity problem.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Error::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}
