//! # ragvault Protocols
//!
//! Core protocol definitions for the ragvault retrieval engine.
//! Contains the data model, the error taxonomy and the two seams the
//! retrieval core depends on. No index or storage implementations live here.
//!
//! ## Core Traits
//!
//! - [`ChunkStore`] - Authoritative, mutation-counted record of chunks
//! - [`EmbeddingProvider`] - External text-to-vector function

pub mod embedding;
pub mod error;
pub mod store;
pub mod types;

pub use embedding::{Embedding, EmbeddingProvider};
pub use error::{EmbeddingError, RetrievalError, StaleIndexWarning, StaleReason, StoreError};
pub use store::{ChangeSet, ChunkStore, SnapshotMarker, StoreScan};
pub use types::*;
