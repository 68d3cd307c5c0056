//! Query, result and statistics types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StaleIndexWarning;
use crate::types::chunk::ChunkId;
use crate::types::common::Metadata;

/// Which indexes a query consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    #[default]
    Hybrid,
    Vector,
    Keyword,
}

impl QueryMode {
    pub fn uses_vector(&self) -> bool {
        matches!(self, Self::Hybrid | Self::Vector)
    }

    pub fn uses_keyword(&self) -> bool {
        matches!(self, Self::Hybrid | Self::Keyword)
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Hybrid => "hybrid",
            Self::Vector => "vector",
            Self::Keyword => "keyword",
        };
        f.write_str(s)
    }
}

impl FromStr for QueryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hybrid" => Ok(Self::Hybrid),
            "vector" => Ok(Self::Vector),
            "keyword" => Ok(Self::Keyword),
            other => Err(format!("unknown query mode: {other}")),
        }
    }
}

/// Index that contributed a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Vector,
    Keyword,
}

/// A candidate's position and native score in one source list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHit {
    pub source: Source,
    /// 1-based rank within the source list.
    pub rank: usize,
    /// Cosine similarity (vector) or BM25 score (keyword).
    pub raw_score: f32,
}

/// One ranked result returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub chunk_id: ChunkId,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Fused score in hybrid mode, native raw score otherwise.
    pub score: f64,
    /// 1-based final rank.
    pub rank: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fused_score: Option<f64>,
    pub sources: Vec<SourceHit>,
}

impl QueryResult {
    /// Native score from one source, if that source contributed.
    pub fn raw_score(&self, source: Source) -> Option<f32> {
        self.sources
            .iter()
            .find(|hit| hit.source == source)
            .map(|hit| hit.raw_score)
    }
}

/// Full answer to a query, including any staleness flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub mode: QueryMode,
    pub results: Vec<QueryResult>,
    /// Non-empty only when keyword results came from a stale snapshot.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<StaleIndexWarning>,
    /// Store version the candidate set is consistent with.
    pub as_of_version: u64,
    /// Version of the corpus snapshot used for keyword scoring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_version: Option<u64>,
}

impl QueryResponse {
    pub fn empty(mode: QueryMode, as_of_version: u64) -> Self {
        Self {
            mode,
            results: Vec::new(),
            warnings: Vec::new(),
            as_of_version,
            snapshot_version: None,
        }
    }

    pub fn is_stale(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Lifecycle state of the corpus snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotState {
    Empty,
    Building,
    Fresh,
    Stale,
}

impl fmt::Display for SnapshotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Empty => "empty",
            Self::Building => "building",
            Self::Fresh => "fresh",
            Self::Stale => "stale",
        };
        f.write_str(s)
    }
}

/// How the last snapshot was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildKind {
    Full,
    Incremental,
}

/// Retriever statistics exposed to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverStats {
    pub chunk_count: usize,
    pub index_freshness: SnapshotState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_version: Option<u64>,
    pub store_version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rebuild_duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rebuild_kind: Option<RebuildKind>,
    pub vector_entries: usize,
    pub vector_pending_removals: usize,
    pub zero_vector_chunks: usize,
    pub dimension: usize,
    /// Snapshot version recorded in the store by a previous rebuild.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persisted_snapshot_version: Option<u64>,
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
