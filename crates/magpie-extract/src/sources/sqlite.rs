//! External SQLite source
//!
//! Lists rows of a table in an external SQLite database. The checkpoint is
//! the highest rowid seen, so only newly inserted rows are listed on later
//! syncs.

use crate::content::sqlite_row_location;
use crate::content::valid_identifier;
use crate::error::{ExtractError, ExtractResult};
use async_trait::async_trait;
use magpie_core::{Error, ExternalFile, FileSource, Integration, Result, SourceListing};
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lists table rows from the database named by the integration's settings.
///
/// Settings:
/// - `path` (required): SQLite database file
/// - `table` (required): table whose rows become documents
pub struct SqliteSource;

#[async_trait]
impl FileSource for SqliteSource {
    async fn list_files(
        &self,
        integration: &Integration,
        checkpoint: Option<&str>,
    ) -> Result<SourceListing> {
        let path = integration
            .settings
            .get("path")
            .ok_or_else(|| ExtractError::MissingSetting("path".to_string()))?
            .clone();
        let table = integration
            .settings
            .get("table")
            .ok_or_else(|| ExtractError::MissingSetting("table".to_string()))?
            .clone();
        let since_rowid: i64 = checkpoint.and_then(|c| c.parse().ok()).unwrap_or(0);

        let listing = tokio::task::spawn_blocking(move || scan_table(&path, &table, since_rowid))
            .await
            .map_err(|e| Error::Other(format!("blocking task failed: {}", e)))??;
        Ok(listing)
    }
}

fn scan_table(path: &str, table: &str, since_rowid: i64) -> ExtractResult<SourceListing> {
    if !valid_identifier(table) {
        return Err(ExtractError::InvalidIdentifier(table.to_string()));
    }
    if !Path::new(path).is_file() {
        return Err(ExtractError::FileNotFound(PathBuf::from(path)));
    }

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let sql = format!(
        "SELECT rowid FROM \"{}\" WHERE rowid > ?1 ORDER BY rowid ASC",
        table
    );
    let mut stmt = conn.prepare(&sql)?;
    let rowids = stmt
        .query_map(params![since_rowid], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;

    let files: Vec<ExternalFile> = rowids
        .iter()
        .map(|&rowid| {
            ExternalFile::new(
                format!("{}::{}", table, rowid),
                format!("{} row {}", table, rowid),
                sqlite_row_location(path, table, rowid),
            )
        })
        .collect();

    let checkpoint = rowids.last().map(|rowid| rowid.to_string());

    debug!(table = %table, count = files.len(), "sqlite listing complete");
    Ok(SourceListing { files, checkpoint })
}

#[cfg(test)]
mod tests {
    use super::*;
    use magpie_core::IntegrationKind;

    fn seed_db(path: &Path, rows: usize) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch("CREATE TABLE notes (title TEXT, body TEXT);")
            .unwrap();
        for i in 0..rows {
            conn.execute(
                "INSERT INTO notes (title, body) VALUES (?1, ?2)",
                params![format!("Note {}", i), format!("Body {}", i)],
            )
            .unwrap();
        }
    }

    fn sqlite_integration(path: &Path) -> Integration {
        Integration::new("local", IntegrationKind::Sqlite, "notes db")
            .with_setting("path", path.to_string_lossy())
            .with_setting("table", "notes")
    }

    #[tokio::test]
    async fn test_lists_all_rows_without_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("kb.sqlite");
        seed_db(&db_path, 3);

        let listing = SqliteSource
            .list_files(&sqlite_integration(&db_path), None)
            .await
            .unwrap();

        assert_eq!(listing.files.len(), 3);
        assert_eq!(listing.files[0].id, "notes::1");
        assert_eq!(listing.files[2].name, "notes row 3");
        assert_eq!(listing.checkpoint.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_checkpoint_skips_seen_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("kb.sqlite");
        seed_db(&db_path, 3);

        let integration = sqlite_integration(&db_path);
        let listing = SqliteSource
            .list_files(&integration, Some("2"))
            .await
            .unwrap();

        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].id, "notes::3");
        assert_eq!(listing.checkpoint.as_deref(), Some("3"));

        // Fully caught up: nothing listed, no new checkpoint.
        let caught_up = SqliteSource
            .list_files(&integration, Some("3"))
            .await
            .unwrap();
        assert!(caught_up.files.is_empty());
        assert!(caught_up.checkpoint.is_none());
    }

    #[tokio::test]
    async fn test_missing_table_setting() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("kb.sqlite");
        seed_db(&db_path, 1);

        let integration = Integration::new("local", IntegrationKind::Sqlite, "notes db")
            .with_setting("path", db_path.to_string_lossy());
        let err = SqliteSource
            .list_files(&integration, None)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("missing required setting 'table'"));
    }

    #[tokio::test]
    async fn test_rejects_unsafe_table_name() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("kb.sqlite");
        seed_db(&db_path, 1);

        let integration = sqlite_integration(&db_path).with_setting("table", "notes; DROP");
        assert!(SqliteSource.list_files(&integration, None).await.is_err());
    }
}
