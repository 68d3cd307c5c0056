//! Storage and embedding configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::ragvault_home;

/// Chunk store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Chunk store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// SQLite database file.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Change-log records kept for incremental snapshot rebuilds.
    #[serde(default = "default_change_log_capacity")]
    pub change_log_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
            change_log_capacity: default_change_log_capacity(),
        }
    }
}

fn default_store_path() -> PathBuf {
    ragvault_home().join("ragvault.db")
}

fn default_change_log_capacity() -> usize {
    10_000
}

/// Embedding provider kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai,
    /// Deterministic local feature hashing. No network.
    #[default]
    Hash,
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Fixed output dimension for this index epoch.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Entries kept by the caching decorator; 0 disables caching.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
            dimension: default_dimension(),
            cache_size: default_cache_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_dimension() -> usize {
    384
}

fn default_cache_size() -> usize {
    1024
}

fn default_timeout_secs() -> u64 {
    30
}
