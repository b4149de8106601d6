//! Error types for LLM operations.

use thiserror::Error;

/// Errors that can occur when talking to the local LLM server.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Request timeout.
    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The requested model is not available.
    #[error("Model not found: {model}. Run 'ollama pull {model}' to download it.")]
    ModelNotFound { model: String },

    /// LLM server is not running.
    #[error("LLM server is not running at {host}. Start it with 'ollama serve'.")]
    ServerNotRunning { host: String },

    /// API returned an error response.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;

impl From<LlmError> for magpie_core::Error {
    fn from(err: LlmError) -> Self {
        magpie_core::Error::Llm(err.to_string())
    }
}
