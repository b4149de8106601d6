//! Configuration structures and loading.

use crate::error::{ConfigError, ConfigResult};
use crate::paths::AppPaths;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub ui: UiConfig,
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> ConfigResult<Self> {
        let paths = AppPaths::new().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from(&paths.config_file)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &PathBuf) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Create a default config file with comments.
    pub fn create_default_file(path: &PathBuf) -> ConfigResult<()> {
        let default_config = Self::default_config_string();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, default_config)?;
        Ok(())
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.worker.max_concurrent_syncs == 0 {
            return Err(ConfigError::Invalid(
                "worker.max_concurrent_syncs must be at least 1".to_string(),
            ));
        }
        if self.chunking.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "chunking.max_tokens must be at least 1".to_string(),
            ));
        }
        if self.chunking.overlap_tokens >= self.chunking.max_tokens {
            return Err(ConfigError::Invalid(
                "chunking.overlap_tokens must be smaller than chunking.max_tokens".to_string(),
            ));
        }
        Ok(())
    }

    /// Generate a default config file with helpful comments.
    pub fn default_config_string() -> String {
        r#"# Magpie Configuration
# Queue-driven integration sync for your knowledge base

[general]
# Data directory for database and logs
# data_dir = "~/.local/share/magpie"

# User id stamped on integrations and syncs created from this machine
default_user = "local"

[worker]
# Maximum sync runs in flight at once
max_concurrent_syncs = 20

# Soft retry limit: exceeding it logs a warning but still processes
max_retries = 3

# How long to sleep when the queue is empty (milliseconds)
poll_interval_ms = 500

# Abort a single sync after this many seconds (0 = no timeout).
# A timed-out sync is left in flight and retried via redelivery.
sync_timeout_secs = 900

# Messages leased longer than this are returned to the queue
visibility_timeout_secs = 600

[chunking]
# Tokens per chunk
max_tokens = 512

# Overlap between consecutive chunks
overlap_tokens = 50

# Chunks shorter than this are merged into their neighbor
min_chunk_tokens = 16

[llm]
# Ollama-compatible server used for entity extraction
host = "http://localhost:11434"

# Model for entity extraction
model = "llama3.2"

# Request timeout in seconds
timeout_seconds = 120

[ui]
# Enable colored output
color = true

# Date format (strftime)
date_format = "%Y-%m-%d %H:%M"
"#
        .to_string()
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub data_dir: Option<String>,
    pub default_user: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_user: "local".to_string(),
        }
    }
}

/// Ingestion worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub max_concurrent_syncs: usize,
    pub max_retries: u32,
    pub poll_interval_ms: u64,
    pub sync_timeout_secs: u64,
    pub visibility_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_syncs: 20,
            max_retries: 3,
            poll_interval_ms: 500,
            sync_timeout_secs: 900,
            visibility_timeout_secs: 600,
        }
    }
}

/// Text chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    pub min_chunk_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            overlap_tokens: 50,
            min_chunk_tokens: 16,
        }
    }
}

/// Local LLM settings for entity extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub host: String,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            timeout_seconds: 120,
        }
    }
}

/// UI/Display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub color: bool,
    pub date_format: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            color: true,
            date_format: "%Y-%m-%d %H:%M".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.worker.max_concurrent_syncs, 20);
        assert_eq!(config.worker.max_retries, 3);
        assert_eq!(config.chunking.max_tokens, 512);
        assert_eq!(config.llm.host, "http://localhost:11434");
        assert_eq!(config.general.default_user, "local");
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(
            config.worker.max_concurrent_syncs,
            deserialized.worker.max_concurrent_syncs
        );
        assert_eq!(config.llm.model, deserialized.llm.model);
    }

    #[test]
    fn test_load_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
            [worker]
            max_concurrent_syncs = 4
            "#
        )
        .unwrap();

        let path = temp_file.path().to_path_buf();
        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.worker.max_concurrent_syncs, 4);
        // Defaults should still work
        assert_eq!(config.worker.max_retries, 3);
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
            [chunking]
            max_tokens = 50
            overlap_tokens = 50
            "#
        )
        .unwrap();

        let path = temp_file.path().to_path_buf();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_default_config_string_parses() {
        let config: Config = toml::from_str(&Config::default_config_string()).unwrap();
        assert_eq!(config.worker.max_concurrent_syncs, 20);
        assert_eq!(config.chunking.overlap_tokens, 50);
    }
}
