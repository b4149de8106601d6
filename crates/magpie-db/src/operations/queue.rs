//! Sync queue operations.
//!
//! Delivery is strictly FIFO by creation time. The priority column is
//! carried for display and logging; it never affects scheduling order.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Duration, Utc};
use magpie_core::{MessagePriority, QueueStatus, QueuedSync};
use rusqlite::params;

impl Database {
    /// Add a sync message to the queue.
    pub fn enqueue(&self, item: &QueuedSync) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO sync_queue (id, payload, priority, status, attempts, error, created_at, started_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                item.id,
                item.payload,
                item.priority.as_str(),
                item.status.as_str(),
                item.attempts,
                item.error,
                item.created_at.to_rfc3339(),
                item.started_at.map(|dt| dt.to_rfc3339()),
                item.completed_at.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Get a queue item by ID.
    pub fn get_queue_item(&self, id: &str) -> DbResult<QueuedSync> {
        let conn = self.conn()?;
        let item = conn.query_row(
            "SELECT id, payload, priority, status, attempts, error, created_at, started_at, completed_at
             FROM sync_queue WHERE id = ?1",
            params![id],
            row_to_queued_sync,
        ).map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(format!("Queue item not found: {}", id)),
            _ => DbError::from(e),
        })?;

        Ok(item)
    }

    /// Lease the oldest pending message (marks it as processing).
    pub fn dequeue(&self) -> DbResult<Option<QueuedSync>> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        let result = conn.query_row(
            "SELECT id, payload, priority, status, attempts, error, created_at, started_at, completed_at
             FROM sync_queue
             WHERE status = 'pending'
             ORDER BY created_at ASC
             LIMIT 1",
            [],
            row_to_queued_sync,
        );

        let item = match result {
            Ok(item) => item,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(DbError::from(e)),
        };

        // Mark as processing
        conn.execute(
            "UPDATE sync_queue SET status = 'processing', started_at = ?2, attempts = attempts + 1 WHERE id = ?1",
            params![item.id, now],
        )?;

        // Re-fetch the updated item using the same connection
        let updated = conn.query_row(
            "SELECT id, payload, priority, status, attempts, error, created_at, started_at, completed_at
             FROM sync_queue WHERE id = ?1",
            params![item.id],
            row_to_queued_sync,
        )?;

        Ok(Some(updated))
    }

    /// Mark a queue item as done.
    pub fn mark_completed(&self, id: &str) -> DbResult<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        let rows = conn.execute(
            "UPDATE sync_queue SET status = 'done', completed_at = ?2 WHERE id = ?1",
            params![id, now],
        )?;

        if rows == 0 {
            return Err(DbError::NotFound(format!("Queue item not found: {}", id)));
        }

        Ok(())
    }

    /// Mark a queue item as terminally failed.
    pub fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        let rows = conn.execute(
            "UPDATE sync_queue SET status = 'failed', error = ?2, completed_at = ?3 WHERE id = ?1",
            params![id, error, now],
        )?;

        if rows == 0 {
            return Err(DbError::NotFound(format!("Queue item not found: {}", id)));
        }

        Ok(())
    }

    /// Return a leased item to pending for redelivery, recording the error
    /// and replacing the payload.
    pub fn requeue(&self, id: &str, payload: &str, error: &str) -> DbResult<()> {
        let conn = self.conn()?;

        let rows = conn.execute(
            "UPDATE sync_queue SET status = 'pending', payload = ?2, error = ?3, started_at = NULL WHERE id = ?1",
            params![id, payload, error],
        )?;

        if rows == 0 {
            return Err(DbError::NotFound(format!("Queue item not found: {}", id)));
        }

        Ok(())
    }

    /// Return items stuck in processing longer than `older_than` to pending.
    ///
    /// Covers workers that crashed between dequeue and ack.
    pub fn requeue_stale(&self, older_than: Duration) -> DbResult<i64> {
        let conn = self.conn()?;
        let cutoff = (Utc::now() - older_than).to_rfc3339();

        let rows = conn.execute(
            "UPDATE sync_queue SET status = 'pending', started_at = NULL
             WHERE status = 'processing' AND (started_at IS NULL OR started_at < ?1)",
            params![cutoff],
        )?;

        Ok(rows as i64)
    }

    /// Retry all failed queue items, returning how many were requeued.
    pub fn retry_failed(&self) -> DbResult<i64> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE sync_queue SET status = 'pending', error = NULL, started_at = NULL, completed_at = NULL
             WHERE status = 'failed'",
            [],
        )?;
        Ok(rows as i64)
    }

    /// List queue items by status, oldest first.
    pub fn list_queue(&self, status: Option<QueueStatus>) -> DbResult<Vec<QueuedSync>> {
        let conn = self.conn()?;

        let items = match status {
            Some(s) => {
                let mut stmt = conn.prepare(
                    "SELECT id, payload, priority, status, attempts, error, created_at, started_at, completed_at
                     FROM sync_queue WHERE status = ?1 ORDER BY created_at ASC",
                )?;
                let rows = stmt.query_map(params![s.as_str()], row_to_queued_sync)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, payload, priority, status, attempts, error, created_at, started_at, completed_at
                     FROM sync_queue ORDER BY created_at ASC",
                )?;
                let rows = stmt.query_map([], row_to_queued_sync)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(items)
    }

    /// Get queue counts by status.
    pub fn queue_counts(&self) -> DbResult<(i64, i64, i64, i64)> {
        let conn = self.conn()?;

        let pending: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;

        let processing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE status = 'processing'",
            [],
            |row| row.get(0),
        )?;

        let done: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE status = 'done'",
            [],
            |row| row.get(0),
        )?;

        let failed: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE status = 'failed'",
            [],
            |row| row.get(0),
        )?;

        Ok((pending, processing, done, failed))
    }
}

fn row_to_queued_sync(row: &rusqlite::Row) -> rusqlite::Result<QueuedSync> {
    let priority_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let created_at_str: String = row.get(6)?;
    let started_at_str: Option<String> = row.get(7)?;
    let completed_at_str: Option<String> = row.get(8)?;

    Ok(QueuedSync {
        id: row.get(0)?,
        payload: row.get(1)?,
        priority: MessagePriority::from_str(&priority_str).unwrap_or(MessagePriority::Normal),
        status: QueueStatus::from_str(&status_str).unwrap_or(QueueStatus::Pending),
        attempts: row.get(4)?,
        error: row.get(5)?,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        started_at: started_at_str.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }),
        completed_at: completed_at_str.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }),
    })
}
