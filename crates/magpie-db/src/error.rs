//! Database error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Database error: {0}")]
    Other(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for magpie_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => magpie_core::Error::NotFound(msg),
            other => magpie_core::Error::Database(other.to_string()),
        }
    }
}
