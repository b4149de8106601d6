//! Aggregate statistics operations.

use crate::database::Database;
use crate::error::DbResult;
use magpie_core::SystemStats;

impl Database {
    /// Get aggregate counts for the status display.
    pub fn get_stats(&self) -> DbResult<SystemStats> {
        let conn = self.conn()?;

        let total_integrations: i64 =
            conn.query_row("SELECT COUNT(*) FROM integrations", [], |row| row.get(0))?;

        let total_documents: i64 =
            conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;

        let completed_documents: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE status = 'completed'",
            [],
            |row| row.get(0),
        )?;

        let failed_documents: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE processing_status = 'failed'",
            [],
            |row| row.get(0),
        )?;

        let total_chunks: i64 =
            conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;

        let graph_nodes: i64 =
            conn.query_row("SELECT COUNT(*) FROM graph_nodes", [], |row| row.get(0))?;

        let graph_relationships: i64 =
            conn.query_row("SELECT COUNT(*) FROM graph_edges", [], |row| row.get(0))?;

        let total_runs: i64 =
            conn.query_row("SELECT COUNT(*) FROM sync_runs", [], |row| row.get(0))?;

        let active_runs: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_runs WHERE status IN ('started', 'processing')",
            [],
            |row| row.get(0),
        )?;

        // Queue stats (inline to use same connection)
        let queue_pending: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;

        let queue_processing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE status = 'processing'",
            [],
            |row| row.get(0),
        )?;

        let queue_failed: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE status = 'failed'",
            [],
            |row| row.get(0),
        )?;

        Ok(SystemStats {
            total_integrations,
            total_documents,
            completed_documents,
            failed_documents,
            total_chunks,
            graph_nodes,
            graph_relationships,
            total_runs,
            active_runs,
            queue_pending,
            queue_processing,
            queue_failed,
        })
    }
}
