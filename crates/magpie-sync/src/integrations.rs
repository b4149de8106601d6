//! Integration processors
//!
//! A processor drives one sync run for a given integration kind. The
//! registry maps kinds to processors; kinds without one take the
//! coordinator's pass-through path.

use crate::processor::DocumentProcessor;
use async_trait::async_trait;
use magpie_core::{
    FileSource, Integration, IntegrationKind, IntegrationStore, ProcessingStatus, Result,
    SyncReport,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Drives ingestion for one integration kind.
#[async_trait]
pub trait IntegrationProcessor: Send + Sync {
    async fn process(&self, integration: &Integration) -> Result<SyncReport>;
}

/// Maps integration kinds to their processors.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: HashMap<IntegrationKind, Arc<dyn IntegrationProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: IntegrationKind, processor: Arc<dyn IntegrationProcessor>) {
        self.processors.insert(kind, processor);
    }

    pub fn get(&self, kind: IntegrationKind) -> Option<Arc<dyn IntegrationProcessor>> {
        self.processors.get(&kind).cloned()
    }
}

/// Generic file-driven sync: list files since the checkpoint, run each
/// through the document pipeline, then advance the checkpoint.
///
/// The checkpoint only moves when every listed file processed cleanly, so
/// failed files are listed and retried on the next run.
pub struct FileSyncProcessor {
    source: Arc<dyn FileSource>,
    integrations: Arc<dyn IntegrationStore>,
    documents: DocumentProcessor,
}

impl FileSyncProcessor {
    pub fn new(
        source: Arc<dyn FileSource>,
        integrations: Arc<dyn IntegrationStore>,
        documents: DocumentProcessor,
    ) -> Self {
        Self {
            source,
            integrations,
            documents,
        }
    }
}

#[async_trait]
impl IntegrationProcessor for FileSyncProcessor {
    async fn process(&self, integration: &Integration) -> Result<SyncReport> {
        let checkpoint = self
            .integrations
            .get_checkpoint(&integration.user_id, &integration.id)
            .await?;
        let listing = self
            .source
            .list_files(integration, checkpoint.as_deref())
            .await?;

        let mut report = SyncReport {
            discovered: listing.files.len(),
            ..Default::default()
        };

        // Strictly sequential within one sync run; resumability stays simple.
        for file in &listing.files {
            let document = match self
                .documents
                .discover(&integration.user_id, &integration.id, file)
                .await?
            {
                Some(document) => document,
                None => {
                    report.skipped += 1;
                    continue;
                }
            };

            let document = self.documents.advance(document, file).await?;
            match document.processing_status {
                ProcessingStatus::Success => report.processed += 1,
                _ => report.failed += 1,
            }
        }

        if report.failed == 0 {
            if let Some(checkpoint) = &listing.checkpoint {
                let updated = self
                    .integrations
                    .update_checkpoint(&integration.user_id, &integration.id, checkpoint)
                    .await?;
                if !updated {
                    warn!(
                        integration_id = %integration.id,
                        "checkpoint not persisted, integration row missing"
                    );
                }
            }
        }

        info!(
            integration = %integration.name,
            discovered = report.discovered,
            processed = report.processed,
            failed = report.failed,
            skipped = report.skipped,
            "integration sync finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magpie_config::ChunkingConfig;
    use magpie_core::memory::InMemoryStore;
    use magpie_core::{ChunkOutcome, ContentExtractor, ExternalFile, SourceListing};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeSource {
        files: Vec<ExternalFile>,
        checkpoint: Option<String>,
        seen_checkpoint: std::sync::Mutex<Option<Option<String>>>,
    }

    impl FakeSource {
        fn new(files: Vec<ExternalFile>, checkpoint: Option<&str>) -> Self {
            Self {
                files,
                checkpoint: checkpoint.map(String::from),
                seen_checkpoint: std::sync::Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl FileSource for FakeSource {
        async fn list_files(
            &self,
            _integration: &Integration,
            checkpoint: Option<&str>,
        ) -> Result<SourceListing> {
            *self.seen_checkpoint.lock().unwrap() = Some(checkpoint.map(String::from));
            Ok(SourceListing {
                files: self.files.clone(),
                checkpoint: self.checkpoint.clone(),
            })
        }
    }

    struct StubContent {
        fail_on: Option<String>,
    }

    #[async_trait]
    impl ContentExtractor for StubContent {
        async fn extract(&self, file: &ExternalFile) -> Result<String> {
            if self.fail_on.as_deref() == Some(file.id.as_str()) {
                return Err(magpie_core::Error::Source("unreadable".to_string()));
            }
            Ok(format!("text of {}", file.id))
        }
    }

    struct StubChunker {
        ok: AtomicBool,
    }

    #[async_trait]
    impl magpie_core::ChunkExtractor for StubChunker {
        async fn chunk_and_extract(
            &self,
            _user_id: &str,
            _document_id: &str,
            _text: &str,
            _max_tokens: usize,
            _overlap_tokens: usize,
        ) -> Result<ChunkOutcome> {
            let ok = self.ok.load(Ordering::SeqCst);
            Ok(ChunkOutcome {
                chunking_ok: ok,
                extraction_ok: ok,
            })
        }

        async fn extract_entities(&self, _user_id: &str, _document_id: &str) -> Result<bool> {
            Ok(true)
        }
    }

    fn file_processor(
        store: Arc<InMemoryStore>,
        source: Arc<FakeSource>,
        fail_on: Option<&str>,
    ) -> FileSyncProcessor {
        let documents = DocumentProcessor::new(
            store.clone(),
            Arc::new(StubContent {
                fail_on: fail_on.map(String::from),
            }),
            Arc::new(StubChunker {
                ok: AtomicBool::new(true),
            }),
            &ChunkingConfig::default(),
        );
        FileSyncProcessor::new(source, store, documents)
    }

    fn seeded_integration(store: &InMemoryStore) -> Integration {
        let integration = Integration::new("local", IntegrationKind::Drive, "share");
        store.add_integration(integration.clone());
        integration
    }

    #[tokio::test]
    async fn test_processes_listed_files_and_advances_checkpoint() {
        let store = Arc::new(InMemoryStore::new());
        let integration = seeded_integration(&store);
        let source = Arc::new(FakeSource::new(
            vec![
                ExternalFile::new("a.txt", "a.txt", "/share/a.txt"),
                ExternalFile::new("b.txt", "b.txt", "/share/b.txt"),
            ],
            Some("cp-1"),
        ));
        let processor = file_processor(store.clone(), source.clone(), None);

        let report = processor.process(&integration).await.unwrap();

        assert_eq!(report.discovered, 2);
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.skipped, 0);
        assert_eq!(store.document_count(), 2);

        // First run listed with no checkpoint; the new one is now persisted.
        assert_eq!(*source.seen_checkpoint.lock().unwrap(), Some(None));
        let stored = store
            .get_checkpoint(&integration.user_id, &integration.id)
            .await
            .unwrap();
        assert_eq!(stored.as_deref(), Some("cp-1"));
    }

    #[tokio::test]
    async fn test_failed_file_blocks_checkpoint() {
        let store = Arc::new(InMemoryStore::new());
        let integration = seeded_integration(&store);
        let source = Arc::new(FakeSource::new(
            vec![
                ExternalFile::new("good.txt", "good.txt", "/share/good.txt"),
                ExternalFile::new("bad.txt", "bad.txt", "/share/bad.txt"),
            ],
            Some("cp-1"),
        ));
        let processor = file_processor(store.clone(), source, Some("bad.txt"));

        let report = processor.process(&integration).await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
        // A failed file means the whole listing is retried next run.
        let stored = store
            .get_checkpoint(&integration.user_id, &integration.id)
            .await
            .unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn test_second_run_skips_processed_files() {
        let store = Arc::new(InMemoryStore::new());
        let integration = seeded_integration(&store);
        let source = Arc::new(FakeSource::new(
            vec![ExternalFile::new("a.txt", "a.txt", "/share/a.txt")],
            None,
        ));
        let processor = file_processor(store.clone(), source, None);

        let first = processor.process(&integration).await.unwrap();
        assert_eq!(first.processed, 1);

        let second = processor.process(&integration).await.unwrap();
        assert_eq!(second.skipped, 1);
        assert_eq!(second.processed, 0);
        assert_eq!(store.document_count(), 1);
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let store = Arc::new(InMemoryStore::new());
        let source = Arc::new(FakeSource::new(Vec::new(), None));
        let mut registry = ProcessorRegistry::new();
        registry.register(
            IntegrationKind::Drive,
            Arc::new(file_processor(store, source, None)),
        );

        assert!(registry.get(IntegrationKind::Drive).is_some());
        assert!(registry.get(IntegrationKind::Notion).is_none());
    }
}
