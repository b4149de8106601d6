//! Port traits connecting the sync core to storage, extraction, and queue
//! backends.
//!
//! Implementations live elsewhere (`magpie-db`, `magpie-extract`); the core
//! components depend only on these traits so tests can substitute in-memory
//! fakes from [`crate::memory`].

use async_trait::async_trait;
use chrono::Duration;

use crate::error::Result;
use crate::types::{
    Chunk, Document, ExternalFile, GraphNode, GraphRelationship, GraphTheme, Integration, SyncMessage,
    SyncRun, SyncStatus,
};

/// Persistence for sync-run records.
#[async_trait]
pub trait SyncRunStore: Send + Sync {
    async fn get_sync_run(&self, user_id: &str, sync_id: &str) -> Result<Option<SyncRun>>;

    /// Most recently created run for a (user, integration) pair.
    async fn latest_for_integration(
        &self,
        user_id: &str,
        integration_id: &str,
    ) -> Result<Option<SyncRun>>;

    async fn create_sync_run(&self, run: &SyncRun) -> Result<()>;

    /// Set the run's status, replacing `error_message` with `error`.
    ///
    /// Transitioning to `Completed` also stamps `completed_at`; passing
    /// `None` for `error` clears a previous failure message.
    async fn update_sync_status(
        &self,
        user_id: &str,
        sync_id: &str,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<()>;
}

/// Read access to integration records plus checkpoint get/update.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    async fn get_integration(
        &self,
        user_id: &str,
        integration_id: &str,
    ) -> Result<Option<Integration>>;

    async fn get_checkpoint(&self, user_id: &str, integration_id: &str)
        -> Result<Option<String>>;

    /// Persist a new checkpoint. Returns false when the integration row was
    /// not found (nothing written).
    async fn update_checkpoint(
        &self,
        user_id: &str,
        integration_id: &str,
        checkpoint: &str,
    ) -> Result<bool>;
}

/// Persistence for per-document processing state.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Look up by the (user_id, original_file_id) dedup identity.
    async fn find_by_origin(
        &self,
        user_id: &str,
        original_file_id: &str,
    ) -> Result<Option<Document>>;

    async fn insert_document(&self, document: &Document) -> Result<()>;

    async fn update_document(&self, document: &Document) -> Result<()>;
}

/// Persistence for document chunks.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Replace all chunks for a document in one shot.
    async fn replace_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<()>;

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>>;
}

/// Knowledge-graph writes performed during entity extraction.
///
/// Every call returns an explicit result; the caller decides per call site
/// whether a failure is fatal or rolls up into a partial-extraction outcome.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Upsert a node, returning its id (existing id on conflict).
    async fn create_node(&self, node: &GraphNode) -> Result<String>;

    async fn create_relationship(&self, relationship: &GraphRelationship) -> Result<String>;

    async fn create_theme(&self, theme: &GraphTheme) -> Result<String>;
}

/// Fetches raw text content for a discovered external file.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, file: &ExternalFile) -> Result<String>;
}

/// Outcome of one chunk-and-extract pass over a document's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub chunking_ok: bool,
    pub extraction_ok: bool,
}

/// Splits content into stored chunks and extracts graph entities.
///
/// Chunking and extraction can fail independently; the outcome reports both
/// so the document state machine can persist a partial result.
#[async_trait]
pub trait ChunkExtractor: Send + Sync {
    async fn chunk_and_extract(
        &self,
        user_id: &str,
        document_id: &str,
        text: &str,
        max_tokens: usize,
        overlap_tokens: usize,
    ) -> Result<ChunkOutcome>;

    /// Re-run only the extraction half over the document's already-persisted
    /// chunks. Returns whether extraction succeeded.
    async fn extract_entities(&self, user_id: &str, document_id: &str) -> Result<bool>;
}

/// Files listed from an external integration since a checkpoint.
#[derive(Debug, Clone, Default)]
pub struct SourceListing {
    pub files: Vec<ExternalFile>,
    /// Checkpoint to persist once every listed file has been processed.
    pub checkpoint: Option<String>,
}

/// Lists the external files an integration currently exposes.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn list_files(
        &self,
        integration: &Integration,
        checkpoint: Option<&str>,
    ) -> Result<SourceListing>;
}

/// One message leased from the queue.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: String,
    pub payload: String,
    /// How many times this message has been leased, this delivery included.
    pub attempts: i32,
}

/// Rewrite a payload's `retry_count` field to the current attempt count.
///
/// Transports call this on nack so redelivered messages carry the real
/// delivery count rather than the producer-set default. Payloads that are
/// not JSON objects pass through untouched.
pub fn rewrite_retry_count(payload: &str, attempts: i32) -> String {
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(serde_json::Value::Object(mut map)) => {
            map.insert("retry_count".to_string(), attempts.into());
            serde_json::Value::Object(map).to_string()
        }
        _ => payload.to_string(),
    }
}

/// Queue transport with at-least-once delivery.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Enqueue a message, returning the queue-side id.
    async fn publish(&self, message: &SyncMessage) -> Result<String>;

    /// Lease the oldest pending message, if any.
    async fn receive(&self) -> Result<Option<Delivery>>;

    async fn ack(&self, delivery_id: &str) -> Result<()>;

    /// Return a message to pending for redelivery, recording the error.
    async fn nack(&self, delivery_id: &str, error: &str) -> Result<()>;

    /// Mark a message terminally failed, recording the error. Rejected
    /// messages are never redelivered.
    async fn reject(&self, delivery_id: &str, error: &str) -> Result<()>;

    /// Return messages stuck in-flight longer than `older_than` to pending.
    /// Returns how many were released.
    async fn release_stale(&self, older_than: Duration) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_retry_count() {
        let rewritten = rewrite_retry_count(r#"{"user_id":"u1","retry_count":0}"#, 3);
        let value: serde_json::Value = serde_json::from_str(&rewritten).unwrap();
        assert_eq!(value["retry_count"], 3);
        assert_eq!(value["user_id"], "u1");

        // Missing field is added rather than erroring.
        let rewritten = rewrite_retry_count(r#"{"user_id":"u1"}"#, 1);
        let value: serde_json::Value = serde_json::from_str(&rewritten).unwrap();
        assert_eq!(value["retry_count"], 1);

        // Non-object payloads are left alone.
        assert_eq!(rewrite_retry_count("not json", 2), "not json");
        assert_eq!(rewrite_retry_count(r#""just a string""#, 2), r#""just a string""#);
    }
}
