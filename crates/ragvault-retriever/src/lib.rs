//! # ragvault Retriever
//!
//! Hybrid retrieval core for ragvault: a brute-force cosine vector index, a
//! BM25 keyword index over versioned corpus snapshots, reciprocal rank
//! fusion, and the [`HybridRetriever`] facade that keeps them consistent
//! with a [`ChunkStore`](ragvault_protocols::ChunkStore).

pub mod bm25;
pub mod fusion;
pub mod memory_store;
pub mod retriever;
pub mod snapshot;
pub mod tokenizer;
pub mod vector_index;

pub use bm25::{Bm25Config, KeywordIndex};
pub use fusion::{FusedHit, FusionConfig, FusionEngine, SourceRank, DEFAULT_RRF_K};
pub use memory_store::{MemoryChunkStore, DEFAULT_CHANGE_LOG_CAPACITY};
pub use retriever::{HybridRetriever, RetrieverConfig, DEFAULT_FETCH_MULTIPLIER};
pub use snapshot::{
    ConsistencyPolicy, CorpusSnapshot, RebuildMode, RebuildReport, ResolvedSnapshot,
    SnapshotConfig, SnapshotEntry, SnapshotManager,
};
pub use tokenizer::{AllowList, DenyList, KeepAll, TokenFilter, Tokenizer};
pub use vector_index::{VectorIndex, VectorIndexConfig, VectorSync, VectorUpsert};
