//! Errors surfaced by the retriever.

use thiserror::Error;

use super::{EmbeddingError, StoreError};
use crate::types::ChunkId;

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Duplicate content: already stored as {0}")]
    DuplicateContent(ChunkId),

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid metadata value for key '{0}': only scalars are allowed")]
    InvalidMetadata(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl RetrievalError {
    /// Whether retrying the same call later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingUnavailable(_) | Self::IndexUnavailable(_)
        )
    }
}

impl From<StoreError> for RetrievalError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateContent { existing } => Self::DuplicateContent(existing),
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Unavailable(msg) => Self::IndexUnavailable(msg),
            StoreError::Serialization(msg) => {
                Self::IndexUnavailable(format!("corrupt store data: {msg}"))
            }
        }
    }
}

impl From<EmbeddingError> for RetrievalError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::Unavailable(msg) => Self::EmbeddingUnavailable(msg),
            EmbeddingError::InvalidInput(msg) => Self::InvalidQuery(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_error() {
        let err = RetrievalError::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        let display = err.to_string();
        assert!(display.contains("384"));
        assert!(display.contains("768"));
    }

    #[test]
    fn test_invalid_metadata_error() {
        let err = RetrievalError::InvalidMetadata("tags".to_string());
        assert!(err.to_string().contains("tags"));
        assert!(err.to_string().contains("scalars"));
    }

    #[test]
    fn test_cancelled_error() {
        assert_eq!(RetrievalError::Cancelled.to_string(), "Operation cancelled");
    }

    #[test]
    fn test_retryable() {
        assert!(RetrievalError::EmbeddingUnavailable("down".to_string()).is_retryable());
        assert!(RetrievalError::IndexUnavailable("locked".to_string()).is_retryable());
        assert!(!RetrievalError::InvalidQuery("top_k".to_string()).is_retryable());
        assert!(!RetrievalError::DimensionMismatch { expected: 2, actual: 3 }.is_retryable());
        assert!(!RetrievalError::Cancelled.is_retryable());
    }

    #[test]
    fn test_from_store_error() {
        let err: RetrievalError = StoreError::DuplicateContent {
            existing: ChunkId::from("abc"),
        }
        .into();
        assert!(matches!(err, RetrievalError::DuplicateContent(ref id) if id.as_str() == "abc"));

        let err: RetrievalError = StoreError::Unavailable("io".to_string()).into();
        assert!(matches!(err, RetrievalError::IndexUnavailable(_)));

        let err: RetrievalError = StoreError::NotFound("x".to_string()).into();
        assert!(matches!(err, RetrievalError::NotFound(_)));
    }

    #[test]
    fn test_from_embedding_error() {
        let err: RetrievalError = EmbeddingError::Unavailable("timeout".to_string()).into();
        assert!(matches!(err, RetrievalError::EmbeddingUnavailable(_)));
        assert!(err.is_retryable());
    }
}
