//! Entity extraction
//!
//! Sends document text to the configured LLM and parses the structured
//! response into entities, relationships, and themes for the knowledge
//! graph.

use magpie_config::LlmConfig;
use magpie_llm::{GenerateOptions, GenerateRequest, LlmClient, LlmResult};
use serde::Deserialize;
use tracing::debug;

/// Cap on how much document text goes into a single extraction prompt.
const MAX_PROMPT_CHARS: usize = 6000;

const SYSTEM_PROMPT: &str = "You extract structured facts from documents. \
Always answer with a single JSON object and nothing else.";

/// Structured extraction result parsed from the model response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExtractedEntities {
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub relationships: Vec<ExtractedRelationship>,
    #[serde(default)]
    pub themes: Vec<String>,
}

impl ExtractedEntities {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty() && self.themes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(default = "default_label")]
    pub label: String,
}

fn default_label() -> String {
    "entity".to_string()
}

/// Entities are referenced by name in `source` and `target`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtractedRelationship {
    pub source: String,
    pub target: String,
    pub relation: String,
}

/// LLM-backed entity extractor.
#[derive(Clone)]
pub struct EntityExtractor {
    client: LlmClient,
    model: String,
}

impl EntityExtractor {
    pub fn new(client: LlmClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> LlmResult<Self> {
        Ok(Self::new(LlmClient::from_config(config)?, &config.model))
    }

    /// Run extraction over document text. Input past the prompt budget is
    /// truncated before building the prompt.
    pub async fn extract_from_text(&self, text: &str) -> LlmResult<ExtractedEntities> {
        let text = truncate_chars(text, MAX_PROMPT_CHARS);

        let request = GenerateRequest::new(&self.model, build_prompt(text))
            .with_system(SYSTEM_PROMPT)
            .with_format("json")
            .with_options(
                GenerateOptions::new()
                    .with_temperature(0.1)
                    .with_num_predict(1024),
            );

        let response = self.client.generate(request).await?;
        debug!(
            model = %self.model,
            eval_count = ?response.eval_count,
            "extraction response received"
        );
        parse_extraction(&response.response)
    }
}

fn build_prompt(text: &str) -> String {
    format!(
        r#"Extract the named entities, the relationships between them, and the overall themes from the document below.

Respond with JSON in exactly this shape:
{{
  "entities": [{{"name": "Ada Lovelace", "label": "person"}}],
  "relationships": [{{"source": "Ada Lovelace", "target": "Analytical Engine", "relation": "worked on"}}],
  "themes": ["computing history"]
}}

Rules:
- Use label values like person, organization, place, product, concept.
- Only include relationships between entities you listed.
- List at most 5 themes.

Document:
{}"#,
        text
    )
}

/// Parse a model response into [`ExtractedEntities`], tolerating markdown
/// code fences around the JSON body.
pub fn parse_extraction(raw: &str) -> LlmResult<ExtractedEntities> {
    let cleaned = clean_json_response(raw);
    let mut extracted: ExtractedEntities = serde_json::from_str(cleaned)?;

    extracted.entities.retain(|e| !e.name.trim().is_empty());
    extracted.relationships.retain(|r| {
        !r.source.trim().is_empty() && !r.target.trim().is_empty() && !r.relation.trim().is_empty()
    });
    extracted.themes.retain(|t| !t.trim().is_empty());

    Ok(extracted)
}

fn clean_json_response(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed);
    trimmed.trim()
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let raw = r#"{"entities": [{"name": "Ada", "label": "person"}],
                      "relationships": [{"source": "Ada", "target": "Engine", "relation": "built"}],
                      "themes": ["history"]}"#;
        let extracted = parse_extraction(raw).unwrap();

        assert_eq!(extracted.entities.len(), 1);
        assert_eq!(extracted.entities[0].name, "Ada");
        assert_eq!(extracted.entities[0].label, "person");
        assert_eq!(extracted.relationships[0].relation, "built");
        assert_eq!(extracted.themes, vec!["history".to_string()]);
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"entities\": [{\"name\": \"Ada\"}]}\n```";
        let extracted = parse_extraction(raw).unwrap();

        assert_eq!(extracted.entities.len(), 1);
        // Missing label falls back to the generic one.
        assert_eq!(extracted.entities[0].label, "entity");
        assert!(extracted.relationships.is_empty());
        assert!(extracted.themes.is_empty());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(parse_extraction("Sure! Here are the entities I found:").is_err());
        assert!(parse_extraction("").is_err());
    }

    #[test]
    fn test_parse_drops_blank_names() {
        let raw = r#"{"entities": [{"name": "  "}, {"name": "Ada"}],
                      "relationships": [{"source": "", "target": "Ada", "relation": "knows"}],
                      "themes": ["", "history"]}"#;
        let extracted = parse_extraction(raw).unwrap();

        assert_eq!(extracted.entities.len(), 1);
        assert!(extracted.relationships.is_empty());
        assert_eq!(extracted.themes, vec!["history".to_string()]);
    }

    #[test]
    fn test_empty_object_parses_empty() {
        let extracted = parse_extraction("{}").unwrap();
        assert!(extracted.is_empty());
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        // Multibyte chars must not be cut mid-sequence.
        assert_eq!(truncate_chars("ééééé", 2), "éé");
    }

    #[test]
    fn test_prompt_contains_document() {
        let prompt = build_prompt("The magpie collected coins.");
        assert!(prompt.contains("The magpie collected coins."));
        assert!(prompt.contains("entities"));
    }
}
