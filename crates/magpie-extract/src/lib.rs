//! Magpie Extract - turns integration content into chunks and graph entities.
//!
//! Sources list the files an integration exposes, content extractors fetch
//! their text, the chunker splits it into storable pieces, and the pipeline
//! persists chunks and LLM-extracted entities.

mod chunker;
mod content;
mod entities;
mod error;
mod pipeline;
mod sources;

pub use chunker::{Chunker, ChunkerConfig, CHARS_PER_TOKEN};
pub use content::{FileContentExtractor, SqliteRowExtractor, DEFAULT_MAX_FILE_BYTES};
pub use entities::{
    parse_extraction, EntityExtractor, ExtractedEntities, ExtractedEntity, ExtractedRelationship,
};
pub use error::{ExtractError, ExtractResult};
pub use pipeline::ExtractionPipeline;
pub use sources::{DriveSource, SqliteSource};
