//! Embedding provider errors.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid embedding input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_error() {
        let err = EmbeddingError::Unavailable("connection refused".to_string());
        let display = err.to_string();
        assert!(display.contains("unavailable"));
        assert!(display.contains("connection refused"));
    }

    #[test]
    fn test_invalid_input_error() {
        let err = EmbeddingError::InvalidInput("empty batch".to_string());
        assert!(err.to_string().contains("Invalid embedding input"));
    }
}
