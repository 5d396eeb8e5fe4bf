use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::compression::SummaryStyle;
use crate::error::{MemoryError, Result};

/// Main configuration structure for newsdesk
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Snapshot storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Vector index configuration
    #[serde(default)]
    pub index: IndexConfig,
    /// Session budget configuration
    #[serde(default)]
    pub budget: BudgetConfig,
    /// Compressor configuration
    #[serde(default)]
    pub compression: CompressionConfig,
    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Semantic summarizer configuration
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    /// Content fetcher configuration
    #[serde(default)]
    pub fetcher: FetcherConfig,
}

impl Config {
    /// Load configuration from an explicit path, or from the first default
    /// location that exists, falling back to built-in defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".newsdesk").join("config.toml")),
            dirs::config_dir().map(|c| c.join("newsdesk").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MemoryError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| MemoryError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the memory core misbehave
    pub fn validate(&self) -> Result<()> {
        if self.index.capacity == 0 {
            return Err(MemoryError::Config("index.capacity must be at least 1".into()));
        }
        if self.budget.session_capacity == 0 {
            return Err(MemoryError::Config(
                "budget.session_capacity must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.index.min_similarity) {
            return Err(MemoryError::Config(
                "index.min_similarity must be within 0.0-1.0".into(),
            ));
        }
        if !(0.0..=0.5).contains(&self.compression.slack_ratio) {
            return Err(MemoryError::Config(
                "compression.slack_ratio must be within 0.0-0.5".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.compression.min_extractive_fill) {
            return Err(MemoryError::Config(
                "compression.min_extractive_fill must be within 0.0-1.0".into(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(MemoryError::Config(
                "embedding.dimension must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Snapshot storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all storage data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// File name of the index snapshot inside `data_dir`
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
}

impl StorageConfig {
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(&self.snapshot_file)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            snapshot_file: default_snapshot_file(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".newsdesk"))
        .unwrap_or_else(|| PathBuf::from(".newsdesk"))
}

fn default_snapshot_file() -> String {
    "index.json".to_string()
}

/// Vector index configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    /// Maximum number of items kept before LRU eviction
    #[serde(default = "default_index_capacity")]
    pub capacity: usize,
    /// Items created longer ago than this are pruned
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
    /// Minimum similarity (0-1) for retrieval hits
    #[serde(default)]
    pub min_similarity: f32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            capacity: default_index_capacity(),
            max_age_days: default_max_age_days(),
            min_similarity: 0.0,
        }
    }
}

fn default_index_capacity() -> usize {
    500
}

fn default_max_age_days() -> u32 {
    60
}

/// Session budget configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BudgetConfig {
    /// Characters admissible into one session's working context
    #[serde(default = "default_session_capacity")]
    pub session_capacity: usize,
    /// Per-item budget used when the caller does not pass one
    #[serde(default = "default_item_budget")]
    pub default_item_budget: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            session_capacity: default_session_capacity(),
            default_item_budget: default_item_budget(),
        }
    }
}

fn default_session_capacity() -> usize {
    24_000
}

fn default_item_budget() -> usize {
    1_500
}

/// Compressor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CompressionConfig {
    /// Allowed overshoot over the target budget, as a fraction of it
    #[serde(default = "default_slack_ratio")]
    pub slack_ratio: f32,
    /// Fraction of the budget an extractive selection must fill to be accepted
    #[serde(default = "default_min_extractive_fill")]
    pub min_extractive_fill: f32,
    /// Weight of the lead-position bonus in extractive scoring
    #[serde(default = "default_lead_bias")]
    pub lead_bias: f32,
    /// Timeout for the semantic summarizer call
    #[serde(default = "default_semantic_timeout_secs")]
    pub semantic_timeout_secs: u64,
    /// Style used when the caller does not pass one
    #[serde(default)]
    pub default_style: SummaryStyle,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            slack_ratio: default_slack_ratio(),
            min_extractive_fill: default_min_extractive_fill(),
            lead_bias: default_lead_bias(),
            semantic_timeout_secs: default_semantic_timeout_secs(),
            default_style: SummaryStyle::default(),
        }
    }
}

fn default_slack_ratio() -> f32 {
    0.05
}

fn default_min_extractive_fill() -> f32 {
    0.6
}

fn default_lead_bias() -> f32 {
    0.5
}

fn default_semantic_timeout_secs() -> u64 {
    20
}

/// Embedding provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider: "hashed" (default) or "fastembed"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Embedding dimension for the hashed provider
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            dimension: default_embedding_dimension(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hashed".to_string()
}

fn default_embedding_dimension() -> usize {
    crate::embedding::EMBEDDING_DIMENSION
}

/// Remote summarizer configuration (OpenAI-compatible API)
#[derive(Debug, Clone, Deserialize)]
pub struct SummarizerConfig {
    /// Enable the semantic compression stage
    #[serde(default)]
    pub enabled: bool,
    /// API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Model name
    #[serde(default = "default_summarizer_model")]
    pub model: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// HTTP timeout in seconds
    #[serde(default = "default_summarizer_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum completion tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_api_url(),
            model: default_summarizer_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_summarizer_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_summarizer_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_summarizer_timeout_secs() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    1024
}

/// Content fetcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Request timeout in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
    /// User-Agent header sent with requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Largest response body accepted
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    concat!("newsdesk/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_bytes() -> usize {
    5 * 1024 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.index.capacity, 500);
        assert_eq!(config.index.max_age_days, 60);
        assert_eq!(config.budget.session_capacity, 24_000);
        assert_eq!(config.compression.slack_ratio, 0.05);
        assert_eq!(config.compression.default_style, SummaryStyle::Balanced);
        assert_eq!(config.embedding.provider, "hashed");
        assert!(!config.summarizer.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_str = r#"
            [index]
            capacity = 50

            [compression]
            default_style = "brief"
            semantic_timeout_secs = 5

            [summarizer]
            enabled = true
            model = "local-model"
        "#;

        let config: Config = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.index.capacity, 50);
        assert_eq!(config.index.max_age_days, 60);
        assert_eq!(config.compression.default_style, SummaryStyle::Brief);
        assert_eq!(config.compression.semantic_timeout_secs, 5);
        assert_eq!(config.compression.min_extractive_fill, 0.6);
        assert!(config.summarizer.enabled);
        assert_eq!(config.summarizer.model, "local-model");
        assert_eq!(config.summarizer.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = Config::default();
        config.index.capacity = 0;
        assert!(matches!(config.validate(), Err(MemoryError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_ratio() {
        let mut config = Config::default();
        config.compression.slack_ratio = 0.9;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.index.min_similarity = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[budget]\nsession_capacity = 1000\n").unwrap();

        let config = Config::load(Some(&path)).expect("load");
        assert_eq!(config.budget.session_capacity, 1000);
        assert_eq!(config.budget.default_item_budget, 1500);
    }

    #[test]
    fn test_load_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[budget\nsession_capacity = ").unwrap();

        assert!(matches!(
            Config::load(Some(&path)),
            Err(MemoryError::Config(_))
        ));
    }

    #[test]
    fn test_snapshot_path() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/tmp/newsdesk"),
            snapshot_file: "index.json".into(),
        };
        assert_eq!(
            storage.snapshot_path(),
            PathBuf::from("/tmp/newsdesk/index.json")
        );
    }
}
