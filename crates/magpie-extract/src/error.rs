//! Error types for the extraction pipeline

use std::path::PathBuf;
use thiserror::Error;

pub type ExtractResult<T> = Result<T, ExtractError>;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("File too large: {path} ({size} bytes, limit {limit})")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    #[error("Integration is missing required setting '{0}'")]
    MissingSetting(String),

    #[error("Invalid source location: {0}")]
    InvalidLocation(String),

    #[error("Invalid identifier '{0}' in source settings")]
    InvalidIdentifier(String),

    #[error("Source database error: {0}")]
    SourceDb(#[from] rusqlite::Error),

    #[error("Extraction error: {0}")]
    Other(String),
}

impl From<ExtractError> for magpie_core::Error {
    fn from(err: ExtractError) -> Self {
        magpie_core::Error::Source(err.to_string())
    }
}
