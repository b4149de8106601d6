//! Content extractors
//!
//! [`ContentExtractor`] implementations that turn a listed [`ExternalFile`]
//! into raw text. Drive integrations read files from disk; SQLite
//! integrations pull text columns out of a single row.

use crate::error::{ExtractError, ExtractResult};
use async_trait::async_trait;
use magpie_core::{ContentExtractor, Error, ExternalFile, Result};
use std::path::PathBuf;
use tracing::debug;

/// Files larger than this are rejected rather than read into memory.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Reads file content from the local filesystem.
pub struct FileContentExtractor {
    max_bytes: u64,
}

impl Default for FileContentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FileContentExtractor {
    pub fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl ContentExtractor for FileContentExtractor {
    async fn extract(&self, file: &ExternalFile) -> Result<String> {
        let path = PathBuf::from(&file.location);

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExtractError::FileNotFound(path).into());
            }
            Err(e) => return Err(ExtractError::Io(e).into()),
        };

        if metadata.len() > self.max_bytes {
            return Err(ExtractError::FileTooLarge {
                path,
                size: metadata.len(),
                limit: self.max_bytes,
            }
            .into());
        }

        debug!(file_id = %file.id, size = metadata.len(), "reading file content");
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(ExtractError::Io)?;
        Ok(content)
    }
}

/// Reads the text columns of one row from an external SQLite database.
///
/// Row locations are produced by the SQLite source as
/// `<db path>::<table>::<rowid>`.
pub struct SqliteRowExtractor;

#[async_trait]
impl ContentExtractor for SqliteRowExtractor {
    async fn extract(&self, file: &ExternalFile) -> Result<String> {
        let (path, table, rowid) = parse_sqlite_row_location(&file.location)?;
        let content = tokio::task::spawn_blocking(move || read_row_text(&path, &table, rowid))
            .await
            .map_err(|e| Error::Other(format!("blocking task failed: {}", e)))??;
        Ok(content)
    }
}

pub(crate) fn sqlite_row_location(path: &str, table: &str, rowid: i64) -> String {
    format!("{}::{}::{}", path, table, rowid)
}

pub(crate) fn parse_sqlite_row_location(location: &str) -> ExtractResult<(String, String, i64)> {
    let mut parts = location.rsplitn(3, "::");
    let rowid = parts.next();
    let table = parts.next();
    let path = parts.next();

    match (path, table, rowid) {
        (Some(path), Some(table), Some(rowid)) => {
            let rowid: i64 = rowid
                .parse()
                .map_err(|_| ExtractError::InvalidLocation(location.to_string()))?;
            Ok((path.to_string(), table.to_string(), rowid))
        }
        _ => Err(ExtractError::InvalidLocation(location.to_string())),
    }
}

/// Table and column names are interpolated into SQL, so they are restricted
/// to plain identifiers.
pub(crate) fn valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn read_row_text(path: &str, table: &str, rowid: i64) -> ExtractResult<String> {
    if !valid_identifier(table) {
        return Err(ExtractError::InvalidIdentifier(table.to_string()));
    }

    let conn = rusqlite::Connection::open_with_flags(
        path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
    )?;

    let sql = format!("SELECT * FROM \"{}\" WHERE rowid = ?1", table);
    let mut stmt = conn.prepare(&sql)?;
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let mut rows = stmt.query(rusqlite::params![rowid])?;
    let row = match rows.next()? {
        Some(row) => row,
        None => {
            return Err(ExtractError::Other(format!(
                "row {} no longer exists in table {}",
                rowid, table
            )));
        }
    };

    let mut sections = Vec::new();
    for (i, name) in column_names.iter().enumerate() {
        if let Ok(rusqlite::types::ValueRef::Text(bytes)) = row.get_ref(i) {
            let value = String::from_utf8_lossy(bytes);
            let value = value.trim();
            if !value.is_empty() {
                sections.push(format!("{}: {}", name, value));
            }
        }
    }

    Ok(sections.join("\n"))
}
