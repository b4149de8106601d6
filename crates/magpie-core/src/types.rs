//! Core domain types for Magpie.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for integrations.
pub type IntegrationId = String;

/// Unique identifier for sync runs.
pub type SyncId = String;

/// Unique identifier for documents.
pub type DocumentId = String;

/// Unique identifier for chunks.
pub type ChunkId = String;

/// Settings key under which an integration's sync checkpoint is stored.
pub const CHECKPOINT_KEY: &str = "checkpoint";

/// Generate a new unique ID.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Kind of external integration a sync pulls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationKind {
    Drive,
    Sqlite,
    Postgres,
    Notion,
    Slack,
}

impl IntegrationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationKind::Drive => "drive",
            IntegrationKind::Sqlite => "sqlite",
            IntegrationKind::Postgres => "postgres",
            IntegrationKind::Notion => "notion",
            IntegrationKind::Slack => "slack",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "drive" => Some(IntegrationKind::Drive),
            "sqlite" => Some(IntegrationKind::Sqlite),
            "postgres" => Some(IntegrationKind::Postgres),
            "notion" => Some(IntegrationKind::Notion),
            "slack" => Some(IntegrationKind::Slack),
            _ => None,
        }
    }
}

impl std::fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A configured external integration.
///
/// The sync pipeline never mutates an integration except its checkpoint,
/// which lives in `settings` under [`CHECKPOINT_KEY`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: IntegrationId,
    pub user_id: String,
    pub kind: IntegrationKind,
    pub name: String,
    pub credential: HashMap<String, String>,
    pub settings: HashMap<String, String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Integration {
    pub fn new(
        user_id: impl Into<String>,
        kind: IntegrationKind,
        name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            kind,
            name: name.into(),
            credential: HashMap::new(),
            settings: HashMap::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn with_credential(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.credential.insert(key.into(), value.into());
        self
    }

    /// The checkpoint recorded by the last fully-successful sync, if any.
    pub fn checkpoint(&self) -> Option<&str> {
        self.settings.get(CHECKPOINT_KEY).map(|s| s.as_str())
    }
}

/// Status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Started,
    Processing,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Started => "started",
            SyncStatus::Processing => "processing",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "started" => Some(SyncStatus::Started),
            "processing" => Some(SyncStatus::Processing),
            "completed" => Some(SyncStatus::Completed),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }

    /// Whether a run in this status still owns its (user, integration) slot.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, SyncStatus::Started | SyncStatus::Processing)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One end-to-end attempt to import an integration's backlog.
///
/// Mutated only by the sync coordinator. `Completed` is terminal for a given
/// sync_id; re-running a completed sync is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub sync_id: SyncId,
    pub integration_id: IntegrationId,
    pub user_id: String,
    pub status: SyncStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncRun {
    pub fn new(user_id: impl Into<String>, integration_id: impl Into<String>) -> Self {
        Self {
            sync_id: new_id(),
            integration_id: integration_id.into(),
            user_id: user_id.into(),
            status: SyncStatus::Started,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Pipeline stage a document has durably reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    MetadataFetched,
    ContentFetched,
    ChunkingSucceeded,
    Completed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::MetadataFetched => "metadata_fetched",
            DocumentStatus::ContentFetched => "content_fetched",
            DocumentStatus::ChunkingSucceeded => "chunking_succeeded",
            DocumentStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "metadata_fetched" => Some(DocumentStatus::MetadataFetched),
            "content_fetched" => Some(DocumentStatus::ContentFetched),
            "chunking_succeeded" => Some(DocumentStatus::ChunkingSucceeded),
            "completed" => Some(DocumentStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of the most recent processing attempt on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    #[default]
    Processing,
    Success,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Success => "success",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "processing" => Some(ProcessingStatus::Processing),
            "success" => Some(ProcessingStatus::Success),
            "failed" => Some(ProcessingStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A document discovered from an external integration.
///
/// Identity for dedup is (user_id, original_file_id). Every stage transition
/// persists the row before the next stage begins; rows are never deleted by
/// the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub user_id: String,
    pub integration_id: IntegrationId,
    pub original_file_id: String,
    pub title: String,
    pub location: String,
    pub status: DocumentStatus,
    pub processing_status: ProcessingStatus,
    pub content: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        user_id: impl Into<String>,
        integration_id: impl Into<String>,
        original_file_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            integration_id: integration_id.into(),
            original_file_id: original_file_id.into(),
            title: title.into(),
            location: String::new(),
            status: DocumentStatus::MetadataFetched,
            processing_status: ProcessingStatus::Processing,
            content: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }
}

/// A file (or row, or page) listed from an external integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalFile {
    /// Stable identity within the integration; becomes `original_file_id`.
    pub id: String,
    pub name: String,
    pub location: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub size_bytes: Option<i64>,
}

impl ExternalFile {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location: location.into(),
            modified_at: None,
            size_bytes: None,
        }
    }

    pub fn with_modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified_at);
        self
    }

    pub fn with_size(mut self, size_bytes: i64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }
}

/// A chunk of document text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub user_id: String,
    pub seq: i32,
    pub text: String,
    pub token_estimate: i32,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    pub fn new(
        document_id: impl Into<String>,
        user_id: impl Into<String>,
        seq: i32,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        Self {
            id: new_id(),
            document_id: document_id.into(),
            user_id: user_id.into(),
            seq,
            token_estimate: (text.chars().count() / 4) as i32,
            text,
            created_at: Utc::now(),
        }
    }
}

/// An entity node in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub user_id: String,
    /// Entity kind as reported by extraction, e.g. "person", "organization".
    pub label: String,
    pub name: String,
    pub document_id: Option<DocumentId>,
    pub created_at: DateTime<Utc>,
}

impl GraphNode {
    pub fn new(
        user_id: impl Into<String>,
        label: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.into(),
            label: label.into(),
            name: name.into(),
            document_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }
}

/// A directed relationship between two graph nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub id: String,
    pub user_id: String,
    pub source_id: String,
    pub target_id: String,
    pub relation: String,
    pub document_id: Option<DocumentId>,
    pub created_at: DateTime<Utc>,
}

impl GraphRelationship {
    pub fn new(
        user_id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation: relation.into(),
            document_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }
}

/// A document-scoped theme in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphTheme {
    pub id: String,
    pub user_id: String,
    pub document_id: DocumentId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl GraphTheme {
    pub fn new(
        user_id: impl Into<String>,
        document_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.into(),
            document_id: document_id.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Priority hint carried by a queue message. Affects logging verbosity only,
/// never scheduling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    #[default]
    Normal,
    High,
}

impl MessagePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessagePriority::Normal => "normal",
            MessagePriority::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "normal" => Some(MessagePriority::Normal),
            "high" => Some(MessagePriority::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessagePriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A sync request as carried on the queue.
///
/// `sync_id` is typed as a UUID so deserialization rejects unparseable ids at
/// the validation boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
    pub user_id: String,
    pub sync_id: Uuid,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub priority: MessagePriority,
}

impl SyncMessage {
    pub fn new(user_id: impl Into<String>, sync_id: Uuid) -> Self {
        Self {
            user_id: user_id.into(),
            sync_id,
            retry_count: 0,
            priority: MessagePriority::Normal,
        }
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

/// Status of a queued sync message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    #[default]
    Pending,
    Processing,
    Done,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Done => "done",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(QueueStatus::Pending),
            "processing" => Some(QueueStatus::Processing),
            "done" => Some(QueueStatus::Done),
            "failed" => Some(QueueStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A sync message as stored by the queue transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedSync {
    pub id: String,
    pub payload: String,
    pub priority: MessagePriority,
    pub status: QueueStatus,
    pub attempts: i32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueuedSync {
    pub fn new(payload: impl Into<String>, priority: MessagePriority) -> Self {
        Self {
            id: new_id(),
            payload: payload.into(),
            priority,
            status: QueueStatus::Pending,
            attempts: 0,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Per-run counters accumulated by an integration processor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub discovered: usize,
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Liveness row maintained by each running worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHealthRecord {
    pub worker_id: String,
    pub started_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub processed: i64,
    pub errors: i64,
}

/// Aggregate counts for the status display.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_integrations: i64,
    pub total_documents: i64,
    pub completed_documents: i64,
    pub failed_documents: i64,
    pub total_chunks: i64,
    pub graph_nodes: i64,
    pub graph_relationships: i64,
    pub total_runs: i64,
    pub active_runs: i64,
    pub queue_pending: i64,
    pub queue_processing: i64,
    pub queue_failed: i64,
}
