//! Extraction pipeline
//!
//! Implements [`ChunkExtractor`]: chunk document text, persist the chunks,
//! then run entity extraction and write the results into the knowledge
//! graph. Chunking and extraction fail independently so the document state
//! machine can record a partial result and resume later.

use crate::chunker::{Chunker, ChunkerConfig};
use crate::entities::{EntityExtractor, ExtractedEntities};
use async_trait::async_trait;
use magpie_config::ChunkingConfig;
use magpie_core::{
    Chunk, ChunkExtractor, ChunkOutcome, ChunkStore, GraphNode, GraphRelationship, GraphStore,
    GraphTheme, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ExtractionPipeline {
    chunk_store: Arc<dyn ChunkStore>,
    graph: Arc<dyn GraphStore>,
    extractor: EntityExtractor,
    min_chunk_tokens: usize,
}

impl ExtractionPipeline {
    pub fn new(
        chunk_store: Arc<dyn ChunkStore>,
        graph: Arc<dyn GraphStore>,
        extractor: EntityExtractor,
        chunking: &ChunkingConfig,
    ) -> Self {
        Self {
            chunk_store,
            graph,
            extractor,
            min_chunk_tokens: chunking.min_chunk_tokens,
        }
    }

    /// Run extraction over joined chunk text and write the graph. Returns
    /// whether extraction fully succeeded; failures are logged, never
    /// raised, so chunked documents keep their chunks.
    async fn run_extraction(&self, user_id: &str, document_id: &str, text: &str) -> bool {
        if text.trim().is_empty() {
            debug!(document_id, "no text to extract from");
            return true;
        }

        let extracted = match self.extractor.extract_from_text(text).await {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!(document_id, error = %e, "entity extraction failed");
                return false;
            }
        };

        if extracted.is_empty() {
            debug!(document_id, "model reported no entities");
            return true;
        }

        self.write_graph(user_id, document_id, extracted).await
    }

    /// Best-effort graph write: one bad row does not stop the rest, but any
    /// failure marks the extraction as incomplete.
    async fn write_graph(
        &self,
        user_id: &str,
        document_id: &str,
        extracted: ExtractedEntities,
    ) -> bool {
        let mut ok = true;
        let mut node_ids: HashMap<String, String> = HashMap::new();

        for entity in &extracted.entities {
            let name = entity.name.trim();
            let node = GraphNode::new(user_id, entity.label.trim().to_lowercase(), name)
                .with_document(document_id);
            match self.graph.create_node(&node).await {
                Ok(id) => {
                    node_ids.insert(name.to_lowercase(), id);
                }
                Err(e) => {
                    warn!(document_id, entity = %name, error = %e, "failed to store graph node");
                    ok = false;
                }
            }
        }

        for rel in &extracted.relationships {
            let source = node_ids.get(&rel.source.trim().to_lowercase());
            let target = node_ids.get(&rel.target.trim().to_lowercase());
            match (source, target) {
                (Some(source_id), Some(target_id)) => {
                    let relationship = GraphRelationship::new(
                        user_id,
                        source_id.clone(),
                        target_id.clone(),
                        rel.relation.trim(),
                    )
                    .with_document(document_id);
                    if let Err(e) = self.graph.create_relationship(&relationship).await {
                        warn!(document_id, error = %e, "failed to store graph relationship");
                        ok = false;
                    }
                }
                _ => {
                    debug!(
                        document_id,
                        source = %rel.source,
                        target = %rel.target,
                        "skipping relationship with unresolved endpoint"
                    );
                }
            }
        }

        for theme in &extracted.themes {
            let theme = GraphTheme::new(user_id, document_id, theme.trim());
            if let Err(e) = self.graph.create_theme(&theme).await {
                warn!(document_id, error = %e, "failed to store graph theme");
                ok = false;
            }
        }

        ok
    }
}

#[async_trait]
impl ChunkExtractor for ExtractionPipeline {
    async fn chunk_and_extract(
        &self,
        user_id: &str,
        document_id: &str,
        text: &str,
        max_tokens: usize,
        overlap_tokens: usize,
    ) -> Result<ChunkOutcome> {
        let config = ChunkerConfig::from_tokens(max_tokens, overlap_tokens, self.min_chunk_tokens);
        let owned_text = text.to_string();
        let owned_document = document_id.to_string();
        let owned_user = user_id.to_string();

        let chunks = match tokio::task::spawn_blocking(move || {
            Chunker::new(config).chunk_text(&owned_document, &owned_user, &owned_text)
        })
        .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(document_id, error = %e, "chunking task failed");
                return Ok(ChunkOutcome {
                    chunking_ok: false,
                    extraction_ok: false,
                });
            }
        };

        if let Err(e) = self.chunk_store.replace_chunks(document_id, &chunks).await {
            warn!(document_id, error = %e, "failed to store chunks");
            return Ok(ChunkOutcome {
                chunking_ok: false,
                extraction_ok: false,
            });
        }
        debug!(document_id, count = chunks.len(), "chunks stored");

        let joined = join_chunk_texts(&chunks);
        let extraction_ok = self.run_extraction(user_id, document_id, &joined).await;

        Ok(ChunkOutcome {
            chunking_ok: true,
            extraction_ok,
        })
    }

    async fn extract_entities(&self, user_id: &str, document_id: &str) -> Result<bool> {
        let chunks = self.chunk_store.chunks_for_document(document_id).await?;
        let joined = join_chunk_texts(&chunks);
        Ok(self.run_extraction(user_id, document_id, &joined).await)
    }
}

fn join_chunk_texts(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ExtractedEntity, ExtractedRelationship};
    use magpie_core::memory::InMemoryStore;
    use magpie_llm::LlmClient;

    // Points at a closed port so LLM calls fail fast.
    fn unreachable_extractor() -> EntityExtractor {
        EntityExtractor::new(LlmClient::new("http://127.0.0.1:1").unwrap(), "test-model")
    }

    fn pipeline_with_store() -> (Arc<InMemoryStore>, ExtractionPipeline) {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = ExtractionPipeline::new(
            store.clone(),
            store.clone(),
            unreachable_extractor(),
            &ChunkingConfig::default(),
        );
        (store, pipeline)
    }

    #[tokio::test]
    async fn test_chunks_survive_extraction_failure() {
        let (store, pipeline) = pipeline_with_store();
        let text = "Magpies collect shiny objects.\n\nThey are corvids.";

        let outcome = pipeline
            .chunk_and_extract("local", "doc-1", text, 512, 50)
            .await
            .unwrap();

        assert!(outcome.chunking_ok);
        assert!(!outcome.extraction_ok);

        let chunks = store.chunks_for_document("doc-1").await.unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks[0].text.contains("Magpies"));
    }

    #[tokio::test]
    async fn test_empty_text_is_a_clean_pass() {
        let (store, pipeline) = pipeline_with_store();

        let outcome = pipeline
            .chunk_and_extract("local", "doc-1", "   ", 512, 50)
            .await
            .unwrap();

        // Nothing to chunk and nothing to extract counts as success.
        assert!(outcome.chunking_ok);
        assert!(outcome.extraction_ok);
        assert!(store.chunks_for_document("doc-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rechunk_replaces_previous_chunks() {
        let (store, pipeline) = pipeline_with_store();

        pipeline
            .chunk_and_extract("local", "doc-1", "First version of the text.", 512, 50)
            .await
            .unwrap();
        pipeline
            .chunk_and_extract("local", "doc-1", "Second version.", 512, 50)
            .await
            .unwrap();

        let chunks = store.chunks_for_document("doc-1").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Second version.");
    }

    #[tokio::test]
    async fn test_write_graph_skips_unresolved_endpoints() {
        let (store, pipeline) = pipeline_with_store();
        let extracted = ExtractedEntities {
            entities: vec![
                ExtractedEntity {
                    name: "Ada Lovelace".to_string(),
                    label: "person".to_string(),
                },
                ExtractedEntity {
                    name: "Analytical Engine".to_string(),
                    label: "machine".to_string(),
                },
            ],
            relationships: vec![
                ExtractedRelationship {
                    source: "Ada Lovelace".to_string(),
                    target: "Analytical Engine".to_string(),
                    relation: "worked on".to_string(),
                },
                // Target was never listed as an entity.
                ExtractedRelationship {
                    source: "Ada Lovelace".to_string(),
                    target: "Ghost".to_string(),
                    relation: "haunts".to_string(),
                },
            ],
            themes: vec!["computing history".to_string()],
        };

        let ok = pipeline.write_graph("local", "doc-1", extracted).await;

        assert!(ok);
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.relationship_count(), 1);
        assert_eq!(store.theme_count(), 1);
    }

    #[tokio::test]
    async fn test_extract_entities_reuses_persisted_chunks() {
        let (_store, pipeline) = pipeline_with_store();

        // No chunks stored yet: nothing to do, trivially successful.
        assert!(pipeline.extract_entities("local", "doc-1").await.unwrap());

        pipeline
            .chunk_and_extract("local", "doc-1", "Magpies are corvids.", 512, 50)
            .await
            .unwrap();

        // Chunks exist now, so the unreachable model makes extraction fail.
        assert!(!pipeline.extract_entities("local", "doc-1").await.unwrap());
    }
}
