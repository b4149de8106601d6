//! HTTP client for the local LLM server.

use crate::error::{LlmError, LlmResult};
use crate::types::*;
use magpie_config::LlmConfig;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Client for the LLM server's HTTP API.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    host: String,
    timeout: Duration,
}

impl LlmClient {
    /// Create a new client from configuration.
    pub fn from_config(config: &LlmConfig) -> LlmResult<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds);

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(LlmError::Http)?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Create a new client with default settings.
    pub fn new(host: impl Into<String>) -> LlmResult<Self> {
        let host = host.into();
        let timeout = Duration::from_secs(120);

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(LlmError::Http)?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Check if the LLM server is available.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.host);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// List all available models.
    pub async fn list_models(&self) -> LlmResult<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.host);
        debug!("Listing models from {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_connect() {
                LlmError::ServerNotRunning {
                    host: self.host.clone(),
                }
            } else if e.is_timeout() {
                LlmError::Timeout {
                    seconds: self.timeout.as_secs(),
                }
            } else {
                LlmError::Http(e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                status,
                message: text,
            });
        }

        let list: ListModelsResponse = response.json().await?;
        Ok(list.models)
    }

    /// Check if a specific model is available.
    pub async fn has_model(&self, model: &str) -> LlmResult<bool> {
        let models = self.list_models().await?;
        // Check both exact match and model without tag
        Ok(models
            .iter()
            .any(|m| m.name == model || m.name.starts_with(&format!("{}:", model))))
    }

    /// Generate text (non-streaming).
    pub async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
        let url = format!("{}/api/generate", self.host);
        debug!("Generating with model {}", request.model);

        // Ensure streaming is off for this method
        let mut request = request;
        request.stream = false;

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LlmError::ServerNotRunning {
                        host: self.host.clone(),
                    }
                } else if e.is_timeout() {
                    LlmError::Timeout {
                        seconds: self.timeout.as_secs(),
                    }
                } else {
                    LlmError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();

            if text.contains("not found") || status.as_u16() == 404 {
                return Err(LlmError::ModelNotFound {
                    model: request.model,
                });
            }

            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message: text,
            });
        }

        let generate_response: GenerateResponse = response.json().await?;
        Ok(generate_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = LlmConfig::default();
        let client = LlmClient::from_config(&config);
        assert!(client.is_ok());
    }

    #[test]
    fn test_generate_request_builder() {
        let request = GenerateRequest::new("llama3.2", "Extract entities from this text.")
            .with_system("You respond with strict JSON.")
            .with_format("json")
            .with_options(GenerateOptions::new().with_temperature(0.1));

        assert_eq!(request.model, "llama3.2");
        assert_eq!(request.format.as_deref(), Some("json"));
        assert!(request.system.is_some());
        assert!(request.options.is_some());
        assert!(!request.stream);
    }
}
