//! Sync run lifecycle operations.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use magpie_core::{SyncRun, SyncStatus};
use rusqlite::params;

impl Database {
    /// Record a new sync run in `started` status.
    pub fn create_sync_run(&self, run: &SyncRun) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO sync_runs (sync_id, integration_id, user_id, status, error_message, created_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                run.sync_id,
                run.integration_id,
                run.user_id,
                run.status.as_str(),
                run.error_message,
                run.created_at.to_rfc3339(),
                run.completed_at.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Get a sync run scoped to its owning user.
    pub fn get_sync_run(&self, user_id: &str, sync_id: &str) -> DbResult<Option<SyncRun>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT sync_id, integration_id, user_id, status, error_message, created_at, completed_at
             FROM sync_runs WHERE sync_id = ?1 AND user_id = ?2",
            params![sync_id, user_id],
            row_to_sync_run,
        );

        match result {
            Ok(run) => Ok(Some(run)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DbError::from(e)),
        }
    }

    /// Most recently created run for a (user, integration) pair.
    pub fn latest_sync_run(
        &self,
        user_id: &str,
        integration_id: &str,
    ) -> DbResult<Option<SyncRun>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT sync_id, integration_id, user_id, status, error_message, created_at, completed_at
             FROM sync_runs WHERE user_id = ?1 AND integration_id = ?2
             ORDER BY created_at DESC LIMIT 1",
            params![user_id, integration_id],
            row_to_sync_run,
        );

        match result {
            Ok(run) => Ok(Some(run)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DbError::from(e)),
        }
    }

    /// Set a run's status, replacing its error message.
    ///
    /// Transitioning to `completed` stamps `completed_at`; passing `None`
    /// for `error` clears any previous failure message.
    pub fn update_sync_status(
        &self,
        user_id: &str,
        sync_id: &str,
        status: SyncStatus,
        error: Option<&str>,
    ) -> DbResult<()> {
        let conn = self.conn()?;
        let completed_at = if status == SyncStatus::Completed {
            Some(Utc::now().to_rfc3339())
        } else {
            None
        };

        let rows = conn.execute(
            "UPDATE sync_runs
             SET status = ?3, error_message = ?4, completed_at = COALESCE(?5, completed_at)
             WHERE sync_id = ?1 AND user_id = ?2",
            params![sync_id, user_id, status.as_str(), error, completed_at],
        )?;

        if rows == 0 {
            return Err(DbError::NotFound(format!("Sync run not found: {}", sync_id)));
        }

        Ok(())
    }

    /// List sync runs for a user, newest first.
    pub fn list_sync_runs(&self, user_id: &str, limit: Option<i64>) -> DbResult<Vec<SyncRun>> {
        let conn = self.conn()?;
        let limit = limit.unwrap_or(50);

        let mut stmt = conn.prepare(
            "SELECT sync_id, integration_id, user_id, status, error_message, created_at, completed_at
             FROM sync_runs WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;

        let runs = stmt.query_map(params![user_id, limit], row_to_sync_run)?;
        runs.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

fn row_to_sync_run(row: &rusqlite::Row) -> rusqlite::Result<SyncRun> {
    let status_str: String = row.get(3)?;
    let created_at_str: String = row.get(5)?;
    let completed_at_str: Option<String> = row.get(6)?;

    Ok(SyncRun {
        sync_id: row.get(0)?,
        integration_id: row.get(1)?,
        user_id: row.get(2)?,
        status: SyncStatus::from_str(&status_str).unwrap_or(SyncStatus::Started),
        error_message: row.get(4)?,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        completed_at: completed_at_str.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }),
    })
}
