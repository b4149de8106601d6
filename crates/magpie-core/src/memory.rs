//! In-memory port implementations for tests and local development.
//!
//! `HashMap`/`Vec` behind `std::sync` locks; no durability. The SQLite-backed
//! implementations in `magpie-db` are the production counterparts.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::error::{Error, Result};
use crate::ports::{
    rewrite_retry_count, ChunkStore, Delivery, DocumentStore, GraphStore, IntegrationStore,
    QueueTransport, SyncRunStore,
};
use crate::types::{
    Chunk, Document, GraphNode, GraphRelationship, GraphTheme, Integration, QueueStatus,
    QueuedSync, SyncMessage, SyncRun, SyncStatus,
};

/// In-memory store implementing every persistence port.
#[derive(Default)]
pub struct InMemoryStore {
    integrations: RwLock<HashMap<String, Integration>>,
    sync_runs: RwLock<HashMap<String, SyncRun>>,
    documents: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<Chunk>>,
    nodes: RwLock<Vec<GraphNode>>,
    relationships: RwLock<Vec<GraphRelationship>>,
    themes: RwLock<Vec<GraphTheme>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an integration (there is no write port for integrations).
    pub fn add_integration(&self, integration: Integration) {
        self.integrations
            .write()
            .unwrap()
            .insert(integration.id.clone(), integration);
    }

    pub fn document_count(&self) -> usize {
        self.documents.read().unwrap().len()
    }

    pub fn document(&self, id: &str) -> Option<Document> {
        self.documents.read().unwrap().get(id).cloned()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().unwrap().len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.read().unwrap().len()
    }

    pub fn theme_count(&self) -> usize {
        self.themes.read().unwrap().len()
    }
}

#[async_trait]
impl SyncRunStore for InMemoryStore {
    async fn get_sync_run(&self, user_id: &str, sync_id: &str) -> Result<Option<SyncRun>> {
        let runs = self.sync_runs.read().unwrap();
        Ok(runs
            .get(sync_id)
            .filter(|run| run.user_id == user_id)
            .cloned())
    }

    async fn latest_for_integration(
        &self,
        user_id: &str,
        integration_id: &str,
    ) -> Result<Option<SyncRun>> {
        let runs = self.sync_runs.read().unwrap();
        Ok(runs
            .values()
            .filter(|run| run.user_id == user_id && run.integration_id == integration_id)
            .max_by_key(|run| run.created_at)
            .cloned())
    }

    async fn create_sync_run(&self, run: &SyncRun) -> Result<()> {
        let mut runs = self.sync_runs.write().unwrap();
        runs.insert(run.sync_id.clone(), run.clone());
        Ok(())
    }

    async fn update_sync_status(
        &self,
        user_id: &str,
        sync_id: &str,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let mut runs = self.sync_runs.write().unwrap();
        let run = runs
            .get_mut(sync_id)
            .filter(|run| run.user_id == user_id)
            .ok_or_else(|| Error::NotFound(format!("sync run {}", sync_id)))?;
        run.status = status;
        run.error_message = error.map(|e| e.to_string());
        if status == SyncStatus::Completed {
            run.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl IntegrationStore for InMemoryStore {
    async fn get_integration(
        &self,
        user_id: &str,
        integration_id: &str,
    ) -> Result<Option<Integration>> {
        let integrations = self.integrations.read().unwrap();
        Ok(integrations
            .get(integration_id)
            .filter(|integration| integration.user_id == user_id)
            .cloned())
    }

    async fn get_checkpoint(
        &self,
        user_id: &str,
        integration_id: &str,
    ) -> Result<Option<String>> {
        let integrations = self.integrations.read().unwrap();
        Ok(integrations
            .get(integration_id)
            .filter(|integration| integration.user_id == user_id)
            .and_then(|integration| integration.checkpoint().map(|c| c.to_string())))
    }

    async fn update_checkpoint(
        &self,
        user_id: &str,
        integration_id: &str,
        checkpoint: &str,
    ) -> Result<bool> {
        let mut integrations = self.integrations.write().unwrap();
        match integrations
            .get_mut(integration_id)
            .filter(|integration| integration.user_id == user_id)
        {
            Some(integration) => {
                integration
                    .settings
                    .insert(crate::types::CHECKPOINT_KEY.to_string(), checkpoint.to_string());
                integration.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find_by_origin(
        &self,
        user_id: &str,
        original_file_id: &str,
    ) -> Result<Option<Document>> {
        let documents = self.documents.read().unwrap();
        Ok(documents
            .values()
            .find(|doc| doc.user_id == user_id && doc.original_file_id == original_file_id)
            .cloned())
    }

    async fn insert_document(&self, document: &Document) -> Result<()> {
        let mut documents = self.documents.write().unwrap();
        let duplicate = documents
            .values()
            .any(|doc| doc.user_id == document.user_id && doc.original_file_id == document.original_file_id);
        if duplicate {
            return Err(Error::InvalidInput(format!(
                "document for file {} already exists",
                document.original_file_id
            )));
        }
        documents.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn update_document(&self, document: &Document) -> Result<()> {
        let mut documents = self.documents.write().unwrap();
        if !documents.contains_key(&document.id) {
            return Err(Error::NotFound(format!("document {}", document.id)));
        }
        let mut updated = document.clone();
        updated.updated_at = Utc::now();
        documents.insert(document.id.clone(), updated);
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn replace_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut stored = self.chunks.write().unwrap();
        stored.retain(|chunk| chunk.document_id != document_id);
        stored.extend(chunks.iter().cloned());
        Ok(())
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let stored = self.chunks.read().unwrap();
        let mut chunks: Vec<Chunk> = stored
            .iter()
            .filter(|chunk| chunk.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|chunk| chunk.seq);
        Ok(chunks)
    }
}

#[async_trait]
impl GraphStore for InMemoryStore {
    async fn create_node(&self, node: &GraphNode) -> Result<String> {
        let mut nodes = self.nodes.write().unwrap();
        if let Some(existing) = nodes.iter().find(|n| {
            n.user_id == node.user_id && n.label == node.label && n.name == node.name
        }) {
            return Ok(existing.id.clone());
        }
        nodes.push(node.clone());
        Ok(node.id.clone())
    }

    async fn create_relationship(&self, relationship: &GraphRelationship) -> Result<String> {
        let mut relationships = self.relationships.write().unwrap();
        relationships.push(relationship.clone());
        Ok(relationship.id.clone())
    }

    async fn create_theme(&self, theme: &GraphTheme) -> Result<String> {
        let mut themes = self.themes.write().unwrap();
        themes.push(theme.clone());
        Ok(theme.id.clone())
    }
}

/// In-memory queue with the same lease/ack/nack semantics as the SQLite
/// transport.
#[derive(Default)]
pub struct InMemoryQueue {
    rows: Mutex<Vec<QueuedSync>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row(&self, id: &str) -> Option<QueuedSync> {
        self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned()
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueue {
    async fn publish(&self, message: &SyncMessage) -> Result<String> {
        let payload = serde_json::to_string(message)?;
        let row = QueuedSync::new(payload, message.priority);
        let id = row.id.clone();
        self.rows.lock().unwrap().push(row);
        Ok(id)
    }

    async fn receive(&self) -> Result<Option<Delivery>> {
        let mut rows = self.rows.lock().unwrap();
        // Vec order is insertion order, so the first pending row is the oldest.
        match rows.iter_mut().find(|row| row.status == QueueStatus::Pending) {
            Some(row) => {
                row.status = QueueStatus::Processing;
                row.attempts += 1;
                row.started_at = Some(Utc::now());
                Ok(Some(Delivery {
                    id: row.id.clone(),
                    payload: row.payload.clone(),
                    attempts: row.attempts,
                }))
            }
            None => Ok(None),
        }
    }

    async fn ack(&self, delivery_id: &str) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|row| row.id == delivery_id)
            .ok_or_else(|| Error::NotFound(format!("queued message {}", delivery_id)))?;
        row.status = QueueStatus::Done;
        row.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn nack(&self, delivery_id: &str, error: &str) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|row| row.id == delivery_id)
            .ok_or_else(|| Error::NotFound(format!("queued message {}", delivery_id)))?;
        row.status = QueueStatus::Pending;
        row.error = Some(error.to_string());
        row.payload = rewrite_retry_count(&row.payload, row.attempts);
        row.started_at = None;
        Ok(())
    }

    async fn reject(&self, delivery_id: &str, error: &str) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|row| row.id == delivery_id)
            .ok_or_else(|| Error::NotFound(format!("queued message {}", delivery_id)))?;
        row.status = QueueStatus::Failed;
        row.error = Some(error.to_string());
        row.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn release_stale(&self, older_than: Duration) -> Result<usize> {
        let cutoff = Utc::now() - older_than;
        let mut rows = self.rows.lock().unwrap();
        let mut released = 0;
        for row in rows.iter_mut() {
            if row.status == QueueStatus::Processing
                && row.started_at.map(|t| t < cutoff).unwrap_or(true)
            {
                row.status = QueueStatus::Pending;
                row.started_at = None;
                released += 1;
            }
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IntegrationKind, MessagePriority};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sync_run_status_update() {
        let store = InMemoryStore::new();
        let run = SyncRun::new("u1", "int1");
        store.create_sync_run(&run).await.unwrap();

        store
            .update_sync_status("u1", &run.sync_id, SyncStatus::Failed, Some("boom"))
            .await
            .unwrap();
        let failed = store.get_sync_run("u1", &run.sync_id).await.unwrap().unwrap();
        assert_eq!(failed.status, SyncStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
        assert!(failed.completed_at.is_none());

        store
            .update_sync_status("u1", &run.sync_id, SyncStatus::Completed, None)
            .await
            .unwrap();
        let completed = store.get_sync_run("u1", &run.sync_id).await.unwrap().unwrap();
        assert_eq!(completed.status, SyncStatus::Completed);
        assert!(completed.error_message.is_none());
        assert!(completed.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_document_rejected() {
        let store = InMemoryStore::new();
        let doc = Document::new("u1", "int1", "file-1", "a.txt");
        store.insert_document(&doc).await.unwrap();

        let dup = Document::new("u1", "int1", "file-1", "a.txt");
        assert!(store.insert_document(&dup).await.is_err());

        let found = store.find_by_origin("u1", "file-1").await.unwrap();
        assert_eq!(found.unwrap().id, doc.id);
    }

    #[tokio::test]
    async fn test_checkpoint_update() {
        let store = InMemoryStore::new();
        let integration = Integration::new("u1", IntegrationKind::Drive, "shared");
        let id = integration.id.clone();
        store.add_integration(integration);

        assert!(store.get_checkpoint("u1", &id).await.unwrap().is_none());
        assert!(store.update_checkpoint("u1", &id, "cp-1").await.unwrap());
        assert_eq!(
            store.get_checkpoint("u1", &id).await.unwrap().as_deref(),
            Some("cp-1")
        );
        assert!(!store.update_checkpoint("u1", "missing", "cp-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_queue_lifecycle_rewrites_retry_count() {
        let queue = InMemoryQueue::new();
        let message = SyncMessage::new("u1", Uuid::new_v4()).with_priority(MessagePriority::High);
        queue.publish(&message).await.unwrap();

        let first = queue.receive().await.unwrap().unwrap();
        assert_eq!(first.attempts, 1);
        assert!(queue.receive().await.unwrap().is_none());

        queue.nack(&first.id, "transient").await.unwrap();
        let second = queue.receive().await.unwrap().unwrap();
        assert_eq!(second.attempts, 2);
        let replayed: SyncMessage = serde_json::from_str(&second.payload).unwrap();
        assert_eq!(replayed.retry_count, 1);
        assert_eq!(replayed.priority, MessagePriority::High);

        queue.ack(&second.id).await.unwrap();
        assert!(queue.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_message_never_redelivers() {
        let queue = InMemoryQueue::new();
        let id = queue
            .publish(&SyncMessage::new("u1", Uuid::new_v4()))
            .await
            .unwrap();
        let delivery = queue.receive().await.unwrap().unwrap();

        queue.reject(&delivery.id, "malformed payload").await.unwrap();

        assert!(queue.receive().await.unwrap().is_none());
        assert_eq!(queue.release_stale(Duration::seconds(-1)).await.unwrap(), 0);
        let row = queue.row(&id).unwrap();
        assert_eq!(row.status, QueueStatus::Failed);
        assert_eq!(row.error.as_deref(), Some("malformed payload"));
    }

    #[tokio::test]
    async fn test_release_stale_requeues_inflight() {
        let queue = InMemoryQueue::new();
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
