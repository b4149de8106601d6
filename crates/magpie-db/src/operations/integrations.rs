//! Integration CRUD and checkpoint operations.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use magpie_core::{Integration, IntegrationKind, CHECKPOINT_KEY};
use rusqlite::params;
use std::collections::HashMap;

impl Database {
    /// Create a new integration.
    pub fn create_integration(&self, integration: &Integration) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO integrations (id, user_id, kind, name, credential, settings, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                integration.id,
                integration.user_id,
                integration.kind.as_str(),
                integration.name,
                serde_json::to_string(&integration.credential)?,
                serde_json::to_string(&integration.settings)?,
                integration.is_active as i32,
                integration.created_at.to_rfc3339(),
                integration.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get an integration scoped to its owning user.
    pub fn get_integration(&self, user_id: &str, id: &str) -> DbResult<Option<Integration>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT id, user_id, kind, name, credential, settings, is_active, created_at, updated_at
             FROM integrations WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
            row_to_integration,
        );

        match result {
            Ok(integration) => Ok(Some(integration)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DbError::from(e)),
        }
    }

    /// List all integrations for a user.
    pub fn list_integrations(&self, user_id: &str) -> DbResult<Vec<Integration>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, kind, name, credential, settings, is_active, created_at, updated_at
             FROM integrations WHERE user_id = ?1 ORDER BY created_at",
        )?;

        let integrations = stmt.query_map(params![user_id], row_to_integration)?;
        integrations
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)
    }

    /// Get the stored sync checkpoint for an integration, if any.
    pub fn get_checkpoint(&self, user_id: &str, integration_id: &str) -> DbResult<Option<String>> {
        let integration = self.get_integration(user_id, integration_id)?;
        Ok(integration.and_then(|i| i.checkpoint().map(|c| c.to_string())))
    }

    /// Persist a new checkpoint into the integration's settings.
    ///
    /// Returns false when no matching integration row exists.
    pub fn update_checkpoint(
        &self,
        user_id: &str,
        integration_id: &str,
        checkpoint: &str,
    ) -> DbResult<bool> {
        let conn = self.conn()?;

        let result = conn.query_row(
            "SELECT settings FROM integrations WHERE id = ?1 AND user_id = ?2",
            params![integration_id, user_id],
            |row| row.get::<_, String>(0),
        );

        let settings_str = match result {
            Ok(s) => s,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(false),
            Err(e) => return Err(DbError::from(e)),
        };

        let mut settings: HashMap<String, String> =
            serde_json::from_str(&settings_str).unwrap_or_default();
        settings.insert(CHECKPOINT_KEY.to_string(), checkpoint.to_string());

        let rows = conn.execute(
            "UPDATE integrations SET settings = ?3, updated_at = ?4 WHERE id = ?1 AND user_id = ?2",
            params![
                integration_id,
                user_id,
                serde_json::to_string(&settings)?,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(rows > 0)
    }
}

fn row_to_integration(row: &rusqlite::Row) -> rusqlite::Result<Integration> {
    let kind_str: String = row.get(2)?;
    let credential_str: String = row.get(4)?;
    let settings_str: String = row.get(5)?;
    let is_active: i32 = row.get(6)?;
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;

    Ok(Integration {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: IntegrationKind::from_str(&kind_str).unwrap_or(IntegrationKind::Drive),
        name: row.get(3)?,
        credential: serde_json::from_str(&credential_str).unwrap_or_default(),
        settings: serde_json::from_str(&settings_str).unwrap_or_default(),
        is_active: is_active != 0,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}
