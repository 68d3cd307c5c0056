//! Chunk store errors.

use thiserror::Error;

use crate::types::ChunkId;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Duplicate content: already stored as {existing}")]
    DuplicateContent { existing: ChunkId },

    #[error("Chunk not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
