//! Text chunking
//!
//! Splits document text into overlapping chunks sized for the extraction
//! model's context window. Paragraph boundaries are preferred, falling back
//! to sentence boundaries and finally fixed character windows for text with
//! no usable structure.

use magpie_config::ChunkingConfig;
use magpie_core::Chunk;

/// Rough character budget per token, shared with `Chunk::new`'s estimate.
pub const CHARS_PER_TOKEN: usize = 4;

/// Chunker settings in characters.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Maximum characters per chunk.
    pub max_chars: usize,
    /// Characters carried over from the end of one chunk into the next.
    pub overlap_chars: usize,
    /// Fragments shorter than this are dropped unless they are the only chunk.
    pub min_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self::from_chunking_config(&ChunkingConfig::default())
    }
}

impl ChunkerConfig {
    pub fn from_tokens(max_tokens: usize, overlap_tokens: usize, min_tokens: usize) -> Self {
        Self {
            max_chars: max_tokens.max(1) * CHARS_PER_TOKEN,
            overlap_chars: overlap_tokens * CHARS_PER_TOKEN,
            min_chars: min_tokens * CHARS_PER_TOKEN,
        }
    }

    pub fn from_chunking_config(config: &ChunkingConfig) -> Self {
        Self::from_tokens(
            config.max_tokens,
            config.overlap_tokens,
            config.min_chunk_tokens,
        )
    }
}

/// Splits text into chunks for storage and entity extraction.
pub struct Chunker {
    config: ChunkerConfig,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Chunk `text` for the given document. Returns an empty vec for
    /// whitespace-only input.
    pub fn chunk_text(&self, document_id: &str, user_id: &str, text: &str) -> Vec<Chunk> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut seq: i32 = 0;

        for paragraph in text.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }

            let paragraph_len = paragraph.chars().count();

            if paragraph_len > self.config.max_chars {
                // Paragraph alone blows the budget; flush and go sentence by
                // sentence.
                if !current.trim().is_empty() {
                    self.push_chunk(&mut chunks, &mut seq, document_id, user_id, &current);
                    current = self.overlap_tail(&current);
                }
                for sentence in split_sentences(paragraph) {
                    let sentence_len = sentence.chars().count();
                    if sentence_len > self.config.max_chars {
                        // No sentence structure either, cut fixed windows.
                        if !current.trim().is_empty() {
                            self.push_chunk(&mut chunks, &mut seq, document_id, user_id, &current);
                        }
                        current.clear();
                        for piece in force_split(&sentence, self.config.max_chars) {
                            self.push_chunk(&mut chunks, &mut seq, document_id, user_id, &piece);
                        }
                        continue;
                    }
                    if current.chars().count() + sentence_len + 1 > self.config.max_chars
                        && !current.trim().is_empty()
                    {
                        self.push_chunk(&mut chunks, &mut seq, document_id, user_id, &current);
                        current = self.overlap_tail(&current);
                    }
                    if !current.is_empty() {
                        current.push(' ');
                    }
                    current.push_str(&sentence);
                }
            } else if current.chars().count() + paragraph_len + 2 > self.config.max_chars
                && !current.trim().is_empty()
            {
                self.push_chunk(&mut chunks, &mut seq, document_id, user_id, &current);
                current = self.overlap_tail(&current);
                if !current.is_empty() {
                    current.push_str("\n\n");
                }
                current.push_str(paragraph);
            } else {
                if !current.is_empty() {
                    current.push_str("\n\n");
                }
                current.push_str(paragraph);
            }
        }

        if !current.trim().is_empty() {
            self.push_chunk(&mut chunks, &mut seq, document_id, user_id, &current);
        }

        chunks
    }

    fn push_chunk(
        &self,
        chunks: &mut Vec<Chunk>,
        seq: &mut i32,
        document_id: &str,
        user_id: &str,
        text: &str,
    ) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        // Undersized fragments are only kept when they would be the first
        // chunk, so short documents still produce one.
        if text.chars().count() < self.config.min_chars && *seq > 0 {
            return;
        }
        chunks.push(Chunk::new(document_id, user_id, *seq, text));
        *seq += 1;
    }

    fn overlap_tail(&self, text: &str) -> String {
        if self.config.overlap_chars == 0 {
            return String::new();
        }
        let chars: Vec<char> = text.chars().collect();
        let start = chars.len().saturating_sub(self.config.overlap_chars);
        chars[start..].iter().collect()
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            match chars.peek() {
                Some(&next) if next == ' ' || next == '\n' => {
                    let sentence = current.trim().to_string();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    current.clear();
                }
                _ => {}
            }
        }
    }

    let tail = current.trim().to_string();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

fn force_split(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|window| window.iter().collect::<String>().trim().to_string())
        .filter(|piece| !piece.is_empty())
        .collect()
}
