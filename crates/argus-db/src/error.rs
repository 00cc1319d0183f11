//! Database error types.

use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Row decode failed: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl DbError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}
