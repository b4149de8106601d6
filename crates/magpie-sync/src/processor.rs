//! Document processor
//!
//! Per-document resumable state machine. Each stage persists the document
//! row before the next stage begins, so a crashed or failed document resumes
//! from its last durable stage instead of restarting.

use chrono::Utc;
use magpie_config::ChunkingConfig;
use magpie_core::{
    ChunkExtractor, ContentExtractor, Document, DocumentStatus, DocumentStore, ExternalFile,
    ProcessingStatus, Result,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct DocumentProcessor {
    documents: Arc<dyn DocumentStore>,
    content: Arc<dyn ContentExtractor>,
    chunker: Arc<dyn ChunkExtractor>,
    max_tokens: usize,
    overlap_tokens: usize,
}

impl DocumentProcessor {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        content: Arc<dyn ContentExtractor>,
        chunker: Arc<dyn ChunkExtractor>,
        chunking: &ChunkingConfig,
    ) -> Self {
        Self {
            documents,
            content,
            chunker,
            max_tokens: chunking.max_tokens,
            overlap_tokens: chunking.overlap_tokens,
        }
    }

    /// Look up or create the document for an external file.
    ///
    /// Returns `None` when the file has already been fully processed. A
    /// previously failed or interrupted document is flipped back to
    /// `Processing` and persisted before it is returned, so a crash mid-resume
    /// still leaves a resumable row.
    pub async fn discover(
        &self,
        user_id: &str,
        integration_id: &str,
        file: &ExternalFile,
    ) -> Result<Option<Document>> {
        match self.documents.find_by_origin(user_id, &file.id).await? {
            Some(existing) => match existing.processing_status {
                ProcessingStatus::Success => {
                    debug!(file_id = %file.id, "document already processed, skipping");
                    Ok(None)
                }
                ProcessingStatus::Failed | ProcessingStatus::Processing => {
                    let mut document = existing;
                    document.processing_status = ProcessingStatus::Processing;
                    document.error = None;
                    document.updated_at = Utc::now();
                    self.documents.update_document(&document).await?;
                    debug!(
                        document_id = %document.id,
                        stage = %document.status,
                        "resuming document"
                    );
                    Ok(Some(document))
                }
            },
            None => {
                let document = Document::new(user_id, integration_id, &file.id, &file.name)
                    .with_location(&file.location);
                self.documents.insert_document(&document).await?;
                debug!(document_id = %document.id, file_id = %file.id, "document discovered");
                Ok(Some(document))
            }
        }
    }

    /// Run the document through its remaining stages until it completes or a
    /// stage fails.
    ///
    /// Stage failures are recorded on the document and returned as `Ok`; only
    /// store write errors propagate as `Err`.
    pub async fn advance(&self, mut document: Document, file: &ExternalFile) -> Result<Document> {
        loop {
            document = match document.status {
                DocumentStatus::MetadataFetched => self.fetch_content(document, file).await?,
                DocumentStatus::ContentFetched => self.chunk_document(document).await?,
                DocumentStatus::ChunkingSucceeded => self.extract_entities(document).await?,
                DocumentStatus::Completed => return Ok(document),
            };

            if document.processing_status == ProcessingStatus::Failed {
                return Ok(document);
            }
        }
    }

    async fn fetch_content(&self, mut document: Document, file: &ExternalFile) -> Result<Document> {
        match self.content.extract(file).await {
            Ok(content) => {
                document.content = Some(content);
                document.status = DocumentStatus::ContentFetched;
                document.updated_at = Utc::now();
                self.documents.update_document(&document).await?;
                debug!(document_id = %document.id, "content fetched");
                Ok(document)
            }
            Err(e) => {
                self.mark_failed(document, &format!("content fetch failed: {}", e))
                    .await
            }
        }
    }

    async fn chunk_document(&self, mut document: Document) -> Result<Document> {
        let text = document.content.clone().unwrap_or_default();
        let outcome = match self
            .chunker
            .chunk_and_extract(
                &document.user_id,
                &document.id,
                &text,
                self.max_tokens,
                self.overlap_tokens,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                return self
                    .mark_failed(document, &format!("chunking failed: {}", e))
                    .await;
            }
        };

        if !outcome.chunking_ok {
            return self.mark_failed(document, "chunking failed").await;
        }
        if !outcome.extraction_ok {
            // Chunks are persisted; only the extraction half needs a redo.
            document.status = DocumentStatus::ChunkingSucceeded;
            return self.mark_failed(document, "entity extraction failed").await;
        }

        self.complete(document).await
    }

    async fn extract_entities(&self, document: Document) -> Result<Document> {
        match self
            .chunker
            .extract_entities(&document.user_id, &document.id)
            .await
        {
            Ok(true) => self.complete(document).await,
            Ok(false) => self.mark_failed(document, "entity extraction failed").await,
            Err(e) => {
                self.mark_failed(document, &format!("entity extraction failed: {}", e))
                    .await
            }
        }
    }

    async fn complete(&self, mut document: Document) -> Result<Document> {
        document.status = DocumentStatus::Completed;
        document.processing_status = ProcessingStatus::Success;
        document.error = None;
        document.updated_at = Utc::now();
        self.documents.update_document(&document).await?;
        debug!(document_id = %document.id, "document completed");
        Ok(document)
    }

    async fn mark_failed(&self, mut document: Document, message: &str) -> Result<Document> {
        warn!(
            document_id = %document.id,
            stage = %document.status,
            error = %message,
            "document stage failed"
        );
        document.processing_status = ProcessingStatus::Failed;
        document.error = Some(message.to_string());
        document.updated_at = Utc::now();
        self.documents.update_document(&document).await?;
        Ok(document)
    }
}
