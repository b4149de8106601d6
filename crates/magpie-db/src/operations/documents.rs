//! Document CRUD operations.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use magpie_core::{Document, DocumentStatus, ProcessingStatus};
use rusqlite::params;

impl Database {
    /// Insert a newly discovered document.
    ///
    /// Fails if a document with the same (user_id, original_file_id) already
    /// exists.
    pub fn insert_document(&self, document: &Document) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO documents (id, user_id, integration_id, original_file_id, title, location,
                                   status, processing_status, content, error, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                document.id,
                document.user_id,
                document.integration_id,
                document.original_file_id,
                document.title,
                document.location,
                document.status.as_str(),
                document.processing_status.as_str(),
                document.content,
                document.error,
                document.created_at.to_rfc3339(),
                document.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Find a document by its (user_id, original_file_id) dedup identity.
    pub fn find_document_by_origin(
        &self,
        user_id: &str,
        original_file_id: &str,
    ) -> DbResult<Option<Document>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT id, user_id, integration_id, original_file_id, title, location,
                    status, processing_status, content, error, created_at, updated_at
             FROM documents WHERE user_id = ?1 AND original_file_id = ?2",
            params![user_id, original_file_id],
            row_to_document,
        );

        match result {
            Ok(document) => Ok(Some(document)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DbError::from(e)),
        }
    }

    /// Persist a document's mutable state after a stage transition.
    pub fn update_document(&self, document: &Document) -> DbResult<()> {
        let conn = self.conn()?;
        let rows = conn.execute(
            r#"
            UPDATE documents
            SET title = ?2, location = ?3, status = ?4, processing_status = ?5,
                content = ?6, error = ?7, updated_at = ?8
            WHERE id = ?1
            "#,
            params![
                document.id,
                document.title,
                document.location,
                document.status.as_str(),
                document.processing_status.as_str(),
                document.content,
                document.error,
                Utc::now().to_rfc3339(),
            ],
        )?;

        if rows == 0 {
            return Err(DbError::NotFound(format!(
                "Document not found: {}",
                document.id
            )));
        }

        Ok(())
    }

    /// List documents for a user, optionally filtered by processing status.
    pub fn list_documents(
        &self,
        user_id: &str,
        processing_status: Option<ProcessingStatus>,
        limit: Option<i64>,
    ) -> DbResult<Vec<Document>> {
        let conn = self.conn()?;
        let limit = limit.unwrap_or(100);

        let documents = match processing_status {
            Some(status) => {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, integration_id, original_file_id, title, location,
                            status, processing_status, content, error, created_at, updated_at
                     FROM documents WHERE user_id = ?1 AND processing_status = ?2
                     ORDER BY updated_at DESC LIMIT ?3",
                )?;
                let rows = stmt.query_map(params![user_id, status.as_str(), limit], row_to_document)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, integration_id, original_file_id, title, location,
                            status, processing_status, content, error, created_at, updated_at
                     FROM documents WHERE user_id = ?1 ORDER BY updated_at DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![user_id, limit], row_to_document)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(documents)
    }
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let status_str: String = row.get(6)?;
    let processing_str: String = row.get(7)?;
    let created_at_str: String = row.get(10)?;
    let updated_at_str: String = row.get(11)?;

    Ok(Document {
        id: row.get(0)?,
        user_id: row.get(1)?,
        integration_id: row.get(2)?,
        original_file_id: row.get(3)?,
        title: row.get(4)?,
        location: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        status: DocumentStatus::from_str(&status_str).unwrap_or(DocumentStatus::MetadataFetched),
        processing_status: ProcessingStatus::from_str(&processing_str)
            .unwrap_or(ProcessingStatus::Processing),
        content: row.get(8)?,
        error: row.get(9)?,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use magpie_core::{Integration, IntegrationKind};

    fn seed_integration(db: &Database) -> Integration {
        let integration = Integration::new("u1", IntegrationKind::Drive, "Shared Drive");
        db.create_integration(&integration).unwrap();
        integration
    }

    #[test]
    fn test_document_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let integration = seed_integration(&db);

        let doc = Document::new("u1", integration.id.clone(), "file-1", "notes.txt")
            .with_location("/mnt/share/notes.txt");
        db.insert_document(&doc).unwrap();

        let fetched = db.find_document_by_origin("u1", "file-1").unwrap().unwrap();
        assert_eq!(fetched.id, doc.id);
        assert_eq!(fetched.title, "notes.txt");
        assert_eq!(fetched.location, "/mnt/share/notes.txt");
        assert_eq!(fetched.status, DocumentStatus::MetadataFetched);
        assert_eq!(fetched.processing_status, ProcessingStatus::Processing);

        assert!(db.find_document_by_origin("u2", "file-1").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_origin_rejected() {
        let db = Database::open_in_memory().unwrap();
        let integration = seed_integration(&db);

        let doc = Document::new("u1", integration.id.clone(), "file-1", "notes.txt");
        db.insert_document(&doc).unwrap();

        let dup = Document::new("u1", integration.id.clone(), "file-1", "notes.txt");
        assert!(db.insert_document(&dup).is_err());
    }

    #[test]
    fn test_update_document_stages() {
        let db = Database::open_in_memory().unwrap();
        let integration = seed_integration(&db);

        let mut doc = Document::new("u1", integration.id.clone(), "file-1", "notes.txt");
        db.insert_document(&doc).unwrap();

        doc.status = DocumentStatus::ContentFetched;
        doc.content = Some("hello world".to_string());
        db.update_document(&doc).unwrap();

        let fetched = db.find_document_by_origin("u1", "file-1").unwrap().unwrap();
        assert_eq!(fetched.status, DocumentStatus::ContentFetched);
        assert_eq!(fetched.content.as_deref(), Some("hello world"));

        doc.status = DocumentStatus::Completed;
        doc.processing_status = ProcessingStatus::Success;
        db.update_document(&doc).unwrap();

        let fetched = db.find_document_by_origin("u1", "file-1").unwrap().unwrap();
        assert_eq!(fetched.status, DocumentStatus::Completed);
        assert_eq!(fetched.processing_status, ProcessingStatus::Success);

        let ghost = Document::new("u1", integration.id.clone(), "file-2", "ghost.txt");
        assert!(db.update_document(&ghost).is_err());
    }

    #[test]
    fn test_list_documents_filter() {
        let db = Database::open_in_memory().unwrap();
        let integration = seed_integration(&db);

        let ok = Document::new("u1", integration.id.clone(), "file-1", "a.txt");
        db.insert_document(&ok).unwrap();

        let mut failed = Document::new("u1", integration.id.clone(), "file-2", "b.txt");
        db.insert_document(&failed).unwrap();
        failed.processing_status = ProcessingStatus::Failed;
        failed.error = Some("chunking failed".to_string());
        db.update_document(&failed).unwrap();

        let all = db.list_documents("u1", None, None).unwrap();
        assert_eq!(all.len(), 2);

        let failures = db
            .list_documents("u1", Some(ProcessingStatus::Failed), None)
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].original_file_id, "file-2");
    }
}
