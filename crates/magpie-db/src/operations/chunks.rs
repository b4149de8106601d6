//! Chunk storage operations.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use magpie_core::Chunk;
use rusqlite::params;

impl Database {
    /// Replace all chunks for a document in one transaction.
    ///
    /// Re-chunking after a retry must not leave stale rows behind, so the
    /// old set is deleted before the new one is written.
    pub fn replace_chunks(&self, document_id: &str, chunks: &[Chunk]) -> DbResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM chunks WHERE document_id = ?1",
            params![document_id],
        )?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO chunks (id, document_id, user_id, seq, text, token_estimate, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;

            for chunk in chunks {
                stmt.execute(params![
                    chunk.id,
                    chunk.document_id,
                    chunk.user_id,
                    chunk.seq,
                    chunk.text,
                    chunk.token_estimate,
                    chunk.created_at.to_rfc3339(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Get all chunks for a document in sequence order.
    pub fn chunks_for_document(&self, document_id: &str) -> DbResult<Vec<Chunk>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, document_id, user_id, seq, text, token_estimate, created_at
             FROM chunks WHERE document_id = ?1 ORDER BY seq",
        )?;

        let chunks = stmt.query_map(params![document_id], |row| {
            let created_at_str: String = row.get(6)?;
            Ok(Chunk {
                id: row.get(0)?,
                document_id: row.get(1)?,
                user_id: row.get(2)?,
                seq: row.get(3)?,
                text: row.get(4)?,
                token_estimate: row.get(5)?,
                created_at: DateTime::parse_from_rfc3339(&created_at_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?;

        chunks.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magpie_core::{Document, Integration, IntegrationKind};

    fn seed_document(db: &Database) -> Document {
        let integration = Integration::new("u1", IntegrationKind::Drive, "Shared Drive");
        db.create_integration(&integration).unwrap();
        let doc = Document::new("u1", integration.id, "file-1", "notes.txt");
        db.insert_document(&doc).unwrap();
        doc
    }

    #[test]
    fn test_replace_chunks() {
        let db = Database::open_in_memory().unwrap();
        let doc = seed_document(&db);

        let first = vec![
            Chunk::new(doc.id.clone(), "u1", 0, "first chunk"),
            Chunk::new(doc.id.clone(), "u1", 1, "second chunk"),
        ];
        db.replace_chunks(&doc.id, &first).unwrap();

        let stored = db.chunks_for_document(&doc.id).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].text, "first chunk");
        assert_eq!(stored[1].seq, 1);

        // Second pass replaces, never appends
        let second = vec![Chunk::new(doc.id.clone(), "u1", 0, "rewritten")];
        db.replace_chunks(&doc.id, &second).unwrap();

        let stored = db.chunks_for_document(&doc.id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text, "rewritten");
    }

    #[test]
    fn test_chunks_ordered_by_seq() {
        let db = Database::open_in_memory().unwrap();
        let doc = seed_document(&db);

        let chunks = vec![
            Chunk::new(doc.id.clone(), "u1", 2, "third"),
            Chunk::new(doc.id.clone(), "u1", 0, "first"),
            Chunk::new(doc.id.clone(), "u1", 1, "second"),
        ];
        db.replace_chunks(&doc.id, &chunks).unwrap();

        let stored = db.chunks_for_document(&doc.id).unwrap();
        let texts: Vec<&str> = stored.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }
}
