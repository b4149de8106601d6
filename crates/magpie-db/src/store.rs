//! Async port implementations backed by [`Database`].
//!
//! rusqlite is synchronous, so every call hops onto the blocking thread pool
//! with a cloned pool handle. Errors surface as `magpie_core::Error`.

use async_trait::async_trait;
use chrono::Duration;

use magpie_core::{
    rewrite_retry_count, Chunk, ChunkStore, Delivery, Document, DocumentStore, Error, GraphNode,
    GraphRelationship, GraphStore, GraphTheme, Integration, IntegrationStore, QueueTransport,
    QueuedSync, Result, SyncMessage, SyncRun, SyncRunStore, SyncStatus,
};

use crate::database::Database;
use crate::error::DbResult;

async fn run_blocking<T, F>(db: &Database, f: F) -> Result<T>
where
    F: FnOnce(Database) -> DbResult<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    match tokio::task::spawn_blocking(move || f(db)).await {
        Ok(result) => result.map_err(Error::from),
        Err(e) => Err(Error::Other(format!("blocking task failed: {}", e))),
    }
}

/// SQLite-backed implementation of the persistence ports.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SyncRunStore for SqliteStore {
    async fn get_sync_run(&self, user_id: &str, sync_id: &str) -> Result<Option<SyncRun>> {
        let (user_id, sync_id) = (user_id.to_string(), sync_id.to_string());
        run_blocking(&self.db, move |db| db.get_sync_run(&user_id, &sync_id)).await
    }

    async fn latest_for_integration(
        &self,
        user_id: &str,
        integration_id: &str,
    ) -> Result<Option<SyncRun>> {
        let (user_id, integration_id) = (user_id.to_string(), integration_id.to_string());
        run_blocking(&self.db, move |db| {
            db.latest_sync_run(&user_id, &integration_id)
        })
        .await
    }

    async fn create_sync_run(&self, run: &SyncRun) -> Result<()> {
        let run = run.clone();
        run_blocking(&self.db, move |db| db.create_sync_run(&run)).await
    }

    async fn update_sync_status(
        &self,
        user_id: &str,
        sync_id: &str,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let (user_id, sync_id) = (user_id.to_string(), sync_id.to_string());
        let error = error.map(|e| e.to_string());
        run_blocking(&self.db, move |db| {
            db.update_sync_status(&user_id, &sync_id, status, error.as_deref())
        })
        .await
    }
}

#[async_trait]
impl IntegrationStore for SqliteStore {
    async fn get_integration(
        &self,
        user_id: &str,
        integration_id: &str,
    ) -> Result<Option<Integration>> {
        let (user_id, integration_id) = (user_id.to_string(), integration_id.to_string());
        run_blocking(&self.db, move |db| {
            db.get_integration(&user_id, &integration_id)
        })
        .await
    }

    async fn get_checkpoint(
        &self,
        user_id: &str,
        integration_id: &str,
    ) -> Result<Option<String>> {
        let (user_id, integration_id) = (user_id.to_string(), integration_id.to_string());
        run_blocking(&self.db, move |db| {
            db.get_checkpoint(&user_id, &integration_id)
        })
        .await
    }

    async fn update_checkpoint(
        &self,
        user_id: &str,
        integration_id: &str,
        checkpoint: &str,
    ) -> Result<bool> {
        let (user_id, integration_id) = (user_id.to_string(), integration_id.to_string());
        let checkpoint = checkpoint.to_string();
        run_blocking(&self.db, move |db| {
            db.update_checkpoint(&user_id, &integration_id, &checkpoint)
        })
        .await
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn find_by_origin(
        &self,
        user_id: &str,
        original_file_id: &str,
    ) -> Result<Option<Document>> {
        let (user_id, original_file_id) = (user_id.to_string(), original_file_id.to_string());
        run_blocking(&self.db, move |db| {
            db.find_document_by_origin(&user_id, &original_file_id)
        })
        .await
    }

    async fn insert_document(&self, document: &Document) -> Result<()> {
        let document = document.clone();
        run_blocking(&self.db, move |db| db.insert_document(&document)).await
    }

    async fn update_document(&self, document: &Document) -> Result<()> {
        let document = document.clone();
        run_blocking(&self.db, move |db| db.update_document(&document)).await
    }
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn replace_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<()> {
        let document_id = document_id.to_string();
        let chunks = chunks.to_vec();
        run_blocking(&self.db, move |db| db.replace_chunks(&document_id, &chunks)).await
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let document_id = document_id.to_string();
        run_blocking(&self.db, move |db| db.chunks_for_document(&document_id)).await
    }
}

#[async_trait]
impl GraphStore for SqliteStore {
    async fn create_node(&self, node: &GraphNode) -> Result<String> {
        let node = node.clone();
        run_blocking(&self.db, move |db| db.upsert_node(&node)).await
    }

    async fn create_relationship(&self, relationship: &GraphRelationship) -> Result<String> {
        let relationship = relationship.clone();
        run_blocking(&self.db, move |db| db.create_relationship(&relationship)).await
    }

    async fn create_theme(&self, theme: &GraphTheme) -> Result<String> {
        let theme = theme.clone();
        run_blocking(&self.db, move |db| db.create_theme(&theme)).await
    }
}

/// SQLite-backed queue transport with at-least-once delivery.
#[derive(Clone)]
pub struct SqliteQueue {
    db: Database,
}

impl SqliteQueue {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl QueueTransport for SqliteQueue {
    async fn publish(&self, message: &SyncMessage) -> Result<String> {
        let message = message.clone();
        run_blocking(&self.db, move |db| {
            let payload = serde_json::to_string(&message)?;
            let item = QueuedSync::new(payload, message.priority);
            db.enqueue(&item)?;
            Ok(item.id)
        })
        .await
    }

    async fn receive(&self) -> Result<Option<Delivery>> {
        run_blocking(&self.db, move |db| {
            Ok(db.dequeue()?.map(|item| Delivery {
                id: item.id,
                payload: item.payload,
                attempts: item.attempts,
            }))
        })
        .await
    }

    async fn ack(&self, delivery_id: &str) -> Result<()> {
        let delivery_id = delivery_id.to_string();
        run_blocking(&self.db, move |db| db.mark_completed(&delivery_id)).await
    }

    async fn nack(&self, delivery_id: &str, error: &str) -> Result<()> {
        let (delivery_id, error) = (delivery_id.to_string(), error.to_string());
        run_blocking(&self.db, move |db| {
            let item = db.get_queue_item(&delivery_id)?;
            let payload = rewrite_retry_count(&item.payload, item.attempts);
            db.requeue(&delivery_id, &payload, &error)
        })
        .await
    }

    async fn reject(&self, delivery_id: &str, error: &str) -> Result<()> {
        let (delivery_id, error) = (delivery_id.to_string(), error.to_string());
        run_blocking(&self.db, move |db| db.mark_failed(&delivery_id, &error)).await
    }

    async fn release_stale(&self, older_than: Duration) -> Result<usize> {
        run_blocking(&self.db, move |db| {
            db.requeue_stale(older_than).map(|n| n as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magpie_core::{IntegrationKind, MessagePriority};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_store_ports_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteStore::new(db.clone());

        let integration = Integration::new("u1", IntegrationKind::Drive, "Shared Drive");
        db.create_integration(&integration).unwrap();

        let fetched = store
            .get_integration("u1", &integration.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.name, "Shared Drive");

        let run = SyncRun::new("u1", integration.id.clone());
        store.create_sync_run(&run).await.unwrap();
        store
            .update_sync_status("u1", &run.sync_id, SyncStatus::Completed, None)
            .await
            .unwrap();

        let latest = store
            .latest_for_integration("u1", &integration.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.status, SyncStatus::Completed);
        assert!(latest.completed_at.is_some());

        let doc = Document::new("u1", integration.id.clone(), "file-1", "notes.txt");
        store.insert_document(&doc).await.unwrap();

        let chunks = vec![Chunk::new(doc.id.clone(), "u1", 0, "hello world")];
        store.replace_chunks(&doc.id, &chunks).await.unwrap();
        assert_eq!(store.chunks_for_document(&doc.id).await.unwrap().len(), 1);

        let node = GraphNode::new("u1", "person", "Ada Lovelace");
        let node_id = store.create_node(&node).await.unwrap();
        let again = store
            .create_node(&GraphNode::new("u1", "person", "Ada Lovelace"))
            .await
            .unwrap();
        assert_eq!(node_id, again);
    }

    #[tokio::test]
    async fn test_queue_transport_redelivery() {
        let db = Database::open_in_memory().unwrap();
        let queue = SqliteQueue::new(db);

        let message =
            SyncMessage::new("u1", Uuid::new_v4()).with_priority(MessagePriority::High);
        queue.publish(&message).await.unwrap();

        let first = queue.receive().await.unwrap().unwrap();
        assert_eq!(first.attempts, 1);
        assert!(queue.receive().await.unwrap().is_none());

        queue.nack(&first.id, "transient").await.unwrap();
        let second = queue.receive().await.unwrap().unwrap();
        assert_eq!(second.attempts, 2);

        // Redelivered payload carries the real attempt count
        let replayed: SyncMessage = serde_json::from_str(&second.payload).unwrap();
        assert_eq!(replayed.retry_count, 1);
        assert_eq!(replayed.priority, MessagePriority::High);
        assert_eq!(replayed.sync_id, message.sync_id);

        queue.ack(&second.id).await.unwrap();
        assert!(queue.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_queue_reject_is_terminal() {
        let db = Database::open_in_memory().unwrap();
        let queue = SqliteQueue::new(db.clone());

        queue
            .publish(&SyncMessage::new("u1", Uuid::new_v4()))
            .await
            .unwrap();
        let delivery = queue.receive().await.unwrap().unwrap();
        queue.reject(&delivery.id, "malformed payload").await.unwrap();

        // Never redelivered, even past the stale cutoff
        assert!(queue.receive().await.unwrap().is_none());
        assert_eq!(queue.release_stale(Duration::seconds(-1)).await.unwrap(), 0);

        let row = db.get_queue_item(&delivery.id).unwrap();
        assert_eq!(row.status, magpie_core::QueueStatus::Failed);
        assert_eq!(row.error.as_deref(), Some("malformed payload"));

        // An operator can still return it to pending
        assert_eq!(db.retry_failed().unwrap(), 1);
        assert!(queue.receive().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_queue_release_stale() {
        let db = Database::open_in_memory().unwrap();
        let queue = SqliteQueue::new(db);

        queue
            .publish(&SyncMessage::new("u1", Uuid::new_v4()))
            .await
            .unwrap();
        let delivery = queue.receive().await.unwrap().unwrap();

        assert_eq!(queue.release_stale(Duration::minutes(10)).await.unwrap(), 0);
        assert_eq!(queue.release_stale(Duration::seconds(-1)).await.unwrap(), 1);

        let again = queue.receive().await.unwrap().unwrap();
        assert_eq!(again.id, delivery.id);
        assert_eq!(again.attempts, 2);
    }
}
