//! Magpie LLM - client for a local LLM server used during entity extraction.

mod client;
mod error;
mod types;

pub use client::LlmClient;
pub use error::{LlmError, LlmResult};
pub use types::*;
