//! Worker health heartbeat operations.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use magpie_core::WorkerHealthRecord;
use rusqlite::params;

impl Database {
    /// Record a worker heartbeat, creating the row on first beat.
    pub fn upsert_worker_health(
        &self,
        worker_id: &str,
        started_at: DateTime<Utc>,
        processed: i64,
        errors: i64,
    ) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO worker_health (worker_id, started_at, last_seen, processed, errors)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(worker_id) DO UPDATE SET
                last_seen = excluded.last_seen,
                processed = excluded.processed,
                errors = excluded.errors
            "#,
            params![
                worker_id,
                started_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
                processed,
                errors,
            ],
        )?;
        Ok(())
    }

    /// List all known workers, most recently seen first.
    pub fn list_worker_health(&self) -> DbResult<Vec<WorkerHealthRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT worker_id, started_at, last_seen, processed, errors
             FROM worker_health ORDER BY last_seen DESC",
        )?;

        let records = stmt.query_map([], |row| {
            let started_at_str: String = row.get(1)?;
            let last_seen_str: String = row.get(2)?;
            Ok(WorkerHealthRecord {
                worker_id: row.get(0)?,
                started_at: DateTime::parse_from_rfc3339(&started_at_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                last_seen: DateTime::parse_from_rfc3339(&last_seen_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                processed: row.get(3)?,
                errors: row.get(4)?,
            })
        })?;

        records.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Remove a worker's health row on clean shutdown.
    pub fn remove_worker_health(&self, worker_id: &str) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM worker_health WHERE worker_id = ?1",
            params![worker_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_upsert() {
        let db = Database::open_in_memory().unwrap();
        let started = Utc::now();

        db.upsert_worker_health("worker-1", started, 0, 0).unwrap();
        db.upsert_worker_health("worker-1", started, 5, 1).unwrap();

        let workers = db.list_worker_health().unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].worker_id, "worker-1");
        assert_eq!(workers[0].processed, 5);
        assert_eq!(workers[0].errors, 1);

        db.remove_worker_health("worker-1").unwrap();
        assert!(db.list_worker_health().unwrap().is_empty());
    }
}
