//! # ragvault Embedding
//!
//! Embedding providers for the retrieval core:
//!
//! - [`OpenAIEmbedding`] - OpenAI-compatible `/embeddings` endpoint
//! - [`HashEmbedding`] - deterministic signed feature hashing, offline
//! - [`CachedEmbeddingProvider`] - bounded cache in front of any provider

mod cached;
mod hash;
mod openai;

pub use cached::CachedEmbeddingProvider;
pub use hash::HashEmbedding;
pub use openai::{OpenAIEmbedding, OpenAIEmbeddingConfig};
