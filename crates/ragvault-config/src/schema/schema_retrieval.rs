//! Retrieval-core configuration types.

use serde::{Deserialize, Serialize};

use super::default_true;

/// Query defaults and fusion parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Candidates fetched per source are `fetch_multiplier * top_k`.
    #[serde(default = "default_fetch_multiplier")]
    pub fetch_multiplier: usize,

    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,

    /// One of `hybrid`, `vector`, `keyword`.
    #[serde(default = "default_mode")]
    pub default_mode: String,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            fetch_multiplier: default_fetch_multiplier(),
            rrf_k: default_rrf_k(),
            default_mode: default_mode(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

fn default_fetch_multiplier() -> usize {
    4
}

fn default_rrf_k() -> f64 {
    60.0
}

fn default_mode() -> String {
    "hybrid".to_string()
}

/// BM25 parameters and the token filter hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordConfig {
    #[serde(default = "default_k1")]
    pub k1: f32,

    #[serde(default = "default_b")]
    pub b: f32,

    /// Tokens dropped before indexing and scoring.
    #[serde(default)]
    pub stopwords: Vec<String>,

    /// When non-empty, only these tokens are kept.
    #[serde(default)]
    pub allowlist: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
            stopwords: Vec::new(),
            allowlist: Vec::new(),
        }
    }
}

fn default_k1() -> f32 {
    1.5
}

fn default_b() -> f32 {
    0.75
}

/// How queries treat a snapshot older than the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotPolicy {
    /// Rebuild synchronously (bounded) before scoring.
    #[default]
    Strict,
    /// Serve the previous snapshot with a staleness warning.
    Relaxed,
}

/// When rebuilds are started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildMode {
    /// On the next keyword access.
    #[default]
    Lazy,
    /// In the background after every write.
    Eager,
}

/// Corpus snapshot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default)]
    pub policy: SnapshotPolicy,

    #[serde(default)]
    pub rebuild: RebuildMode,

    /// Apply the store's change log instead of rescanning when possible.
    #[serde(default = "default_true")]
    pub incremental: bool,

    /// Longest a strict query waits for a rebuild.
    #[serde(default = "default_max_sync_rebuild_ms")]
    pub max_sync_rebuild_ms: u64,

    /// Build the first snapshot while opening the retriever.
    #[serde(default = "default_true")]
    pub warm_on_start: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            policy: SnapshotPolicy::default(),
            rebuild: RebuildMode::default(),
            incremental: true,
            max_sync_rebuild_ms: default_max_sync_rebuild_ms(),
            warm_on_start: true,
        }
    }
}

fn default_max_sync_rebuild_ms() -> u64 {
    2_000
}

/// Vector index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Fraction of pending removals that triggers a vacuum.
    #[serde(default = "default_vacuum_threshold")]
    pub vacuum_threshold: f32,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            vacuum_threshold: default_vacuum_threshold(),
        }
    }
}

fn default_vacuum_threshold() -> f32 {
    0.25
}
