//! Corpus snapshots and their lifecycle.

mod corpus;
mod manager;

pub use corpus::{CorpusSnapshot, SnapshotEntry};
pub use manager::{
    ConsistencyPolicy, RebuildMode, RebuildReport, ResolvedSnapshot, SnapshotConfig,
    SnapshotManager,
};
