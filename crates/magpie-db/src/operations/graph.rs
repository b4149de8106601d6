//! Knowledge graph write operations.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use magpie_core::{GraphNode, GraphRelationship, GraphTheme};
use rusqlite::params;

impl Database {
    /// Upsert a graph node, returning its id.
    ///
    /// Nodes are identified by (user_id, label, name); re-extracting the
    /// same entity returns the existing node's id instead of inserting.
    pub fn upsert_node(&self, node: &GraphNode) -> DbResult<String> {
        let conn = self.conn()?;

        let existing = conn.query_row(
            "SELECT id FROM graph_nodes WHERE user_id = ?1 AND label = ?2 AND name = ?3",
            params![node.user_id, node.label, node.name],
            |row| row.get::<_, String>(0),
        );

        match existing {
            Ok(id) => return Ok(id),
            Err(rusqlite::Error::QueryReturnedNoRows) => {}
            Err(e) => return Err(DbError::from(e)),
        }

        conn.execute(
            r#"
            INSERT INTO graph_nodes (id, user_id, label, name, document_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                node.id,
                node.user_id,
                node.label,
                node.name,
                node.document_id,
                node.created_at.to_rfc3339(),
            ],
        )?;

        Ok(node.id.clone())
    }

    /// Create a directed relationship between two existing nodes.
    pub fn create_relationship(&self, relationship: &GraphRelationship) -> DbResult<String> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO graph_edges (id, user_id, source_id, target_id, relation, document_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                relationship.id,
                relationship.user_id,
                relationship.source_id,
                relationship.target_id,
                relationship.relation,
                relationship.document_id,
                relationship.created_at.to_rfc3339(),
            ],
        )?;
        Ok(relationship.id.clone())
    }

    /// Create a document-scoped theme.
    pub fn create_theme(&self, theme: &GraphTheme) -> DbResult<String> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO graph_themes (id, user_id, document_id, name, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                theme.id,
                theme.user_id,
                theme.document_id,
                theme.name,
                theme.created_at.to_rfc3339(),
            ],
        )?;
        Ok(theme.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_node_dedupes() {
        let db = Database::open_in_memory().unwrap();

        let node = GraphNode::new("u1", "person", "Ada Lovelace");
        let first_id = db.upsert_node(&node).unwrap();
        assert_eq!(first_id, node.id);

        // Same entity from another document resolves to the same node
        let again = GraphNode::new("u1", "person", "Ada Lovelace").with_document("doc-2");
        let second_id = db.upsert_node(&again).unwrap();
        assert_eq!(second_id, first_id);

        // Different label is a different node
        let org = GraphNode::new("u1", "organization", "Ada Lovelace");
        let org_id = db.upsert_node(&org).unwrap();
        assert_ne!(org_id, first_id);
    }

    #[test]
    fn test_relationship_and_theme() {
        let db = Database::open_in_memory().unwrap();

        let source = GraphNode::new("u1", "person", "Ada Lovelace");
        let target = GraphNode::new("u1", "person", "Charles Babbage");
        let source_id = db.upsert_node(&source).unwrap();
        let target_id = db.upsert_node(&target).unwrap();

        let rel = GraphRelationship::new("u1", source_id, target_id, "collaborated_with")
            .with_document("doc-1");
        let rel_id = db.create_relationship(&rel).unwrap();
        assert_eq!(rel_id, rel.id);

        let theme = GraphTheme::new("u1", "doc-1", "computing history");
        let theme_id = db.create_theme(&theme).unwrap();
        assert_eq!(theme_id, theme.id);
    }

    #[test]
    fn test_relationship_requires_nodes() {
        let db = Database::open_in_memory().unwrap();

        let rel = GraphRelationship::new("u1", "ghost-a", "ghost-b", "knows");
        assert!(db.create_relationship(&rel).is_err());
    }
}
