//! Database migrations and schema management.

use crate::error::DbResult;
use rusqlite::Connection;
use tracing::info;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> DbResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating initial database schema...");
        create_initial_schema(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating database from version {} to {}",
            current_version, SCHEMA_VERSION
        );
        run_migrations(conn, current_version)?;
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> DbResult<i32> {
    // Check if user_version is set
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> DbResult<()> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

fn create_initial_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        r#"
        -- Connected external sources
        CREATE TABLE IF NOT EXISTS integrations (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            credential TEXT DEFAULT '{}',
            settings TEXT DEFAULT '{}',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_integrations_user ON integrations(user_id);

        -- One row per sync attempt
        CREATE TABLE IF NOT EXISTS sync_runs (
            sync_id TEXT PRIMARY KEY,
            integration_id TEXT NOT NULL REFERENCES integrations(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'started',
            error_message TEXT,
            created_at TEXT NOT NULL,
            completed_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_sync_runs_integration ON sync_runs(integration_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_sync_runs_user ON sync_runs(user_id);

        -- Ingested documents; (user_id, original_file_id) is the dedup identity
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            integration_id TEXT NOT NULL REFERENCES integrations(id) ON DELETE CASCADE,
            original_file_id TEXT NOT NULL,
            title TEXT NOT NULL,
            location TEXT,
            status TEXT NOT NULL,
            processing_status TEXT NOT NULL,
            content TEXT,
            error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (user_id, original_file_id)
        );

        CREATE INDEX IF NOT EXISTS idx_documents_integration ON documents(integration_id);
        CREATE INDEX IF NOT EXISTS idx_documents_processing ON documents(processing_status);

        -- Chunked document text
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            text TEXT NOT NULL,
            token_estimate INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);

        -- Knowledge graph extracted from documents
        CREATE TABLE IF NOT EXISTS graph_nodes (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            label TEXT NOT NULL,
            name TEXT NOT NULL,
            document_id TEXT,
            created_at TEXT NOT NULL,
            UNIQUE (user_id, label, name)
        );

        CREATE TABLE IF NOT EXISTS graph_edges (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            source_id TEXT NOT NULL REFERENCES graph_nodes(id) ON DELETE CASCADE,
            target_id TEXT NOT NULL REFERENCES graph_nodes(id) ON DELETE CASCADE,
            relation TEXT NOT NULL,
            document_id TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_graph_edges_source ON graph_edges(source_id);
        CREATE INDEX IF NOT EXISTS idx_graph_edges_target ON graph_edges(target_id);

        CREATE TABLE IF NOT EXISTS graph_themes (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            document_id TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_graph_themes_document ON graph_themes(document_id);

        -- Sync request queue
        CREATE TABLE IF NOT EXISTS sync_queue (
            id TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            priority TEXT NOT NULL DEFAULT 'normal',
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_sync_queue_status ON sync_queue(status);
        CREATE INDEX IF NOT EXISTS idx_sync_queue_created ON sync_queue(created_at);

        -- Worker liveness heartbeats
        CREATE TABLE IF NOT EXISTS worker_health (
            worker_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            last_seen TEXT NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0,
            errors INTEGER NOT NULL DEFAULT 0
        );

        -- Enable foreign keys
        PRAGMA foreign_keys = ON;
        "#,
    )?;

    Ok(())
}

fn run_migrations(conn: &Connection, from_version: i32) -> DbResult<()> {
    // Future migrations go here
    // Example:
    // if from_version < 2 {
    //     migrate_v1_to_v2(conn)?;
    // }

    let _ = (conn, from_version); // Silence unused warnings

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}
