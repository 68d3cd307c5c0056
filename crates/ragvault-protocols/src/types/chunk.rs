//! Chunk and document types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::embedding::Embedding;
use crate::types::common::{
    metadata_ordinal, metadata_str, Metadata, DEFAULT_DOCUMENT_ID, DOCUMENT_ID_KEY,
};

const FIELD_SEPARATOR: u8 = 0x1f;

/// Content-addressed chunk identifier.
///
/// Lowercase hex SHA-256 of `document_id`, `ordinal` and the normalized text.
/// Ordering is lexicographic and is the ascending order used by every
/// tie-break in the retrieval core.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Derive the id for a chunk.
    pub fn derive(document_id: &str, ordinal: u32, text: &str) -> Self {
        let normalized = normalize_text(text);
        let mut hasher = Sha256::new();
        hasher.update(document_id.as_bytes());
        hasher.update([FIELD_SEPARATOR]);
        hasher.update(ordinal.to_string().as_bytes());
        hasher.update([FIELD_SEPARATOR]);
        hasher.update(normalized.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an existing id string (e.g. read back from storage or a URL).
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for log lines and tables.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChunkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ChunkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Collapse whitespace runs to a single space and trim the ends.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase hex SHA-256 of the normalized text.
pub fn content_hash(text: &str) -> String {
    let normalized = normalize_text(text);
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Caller-supplied chunk before it has an id or an embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInput {
    pub text: String,
    pub document_id: String,
    pub ordinal: u32,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ChunkInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            document_id: DEFAULT_DOCUMENT_ID.to_string(),
            ordinal: 0,
            metadata: Metadata::new(),
        }
    }

    /// Build an input from text plus metadata, reading `document_id` and
    /// `ordinal` from the metadata when present.
    pub fn from_metadata(text: impl Into<String>, metadata: Metadata) -> Self {
        let document_id = metadata_str(&metadata, DOCUMENT_ID_KEY)
            .unwrap_or(DEFAULT_DOCUMENT_ID)
            .to_string();
        let ordinal = metadata_ordinal(&metadata).unwrap_or(0);
        Self {
            text: text.into(),
            document_id,
            ordinal,
            metadata,
        }
    }

    pub fn with_document(mut self, document_id: impl Into<String>, ordinal: u32) -> Self {
        self.document_id = document_id.into();
        self.ordinal = ordinal;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The id this input will be stored under.
    pub fn chunk_id(&self) -> ChunkId {
        ChunkId::derive(&self.document_id, self.ordinal, &self.text)
    }
}

/// The smallest indexed unit of text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: String,
    pub ordinal: u32,
    pub text: String,
    pub content_hash: String,
    /// `None` when the provider returned a zero-magnitude vector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
    #[serde(default)]
    pub metadata: Metadata,
    pub inserted_at: DateTime<Utc>,
    /// Mutation counter value of the insert that created this chunk.
    #[serde(default)]
    pub version: u64,
}

impl Chunk {
    /// Build an unstored chunk from an input and its embedding.
    pub fn from_input(input: ChunkInput, embedding: Option<Embedding>) -> Self {
        let id = input.chunk_id();
        let content_hash = content_hash(&input.text);
        Self {
            id,
            document_id: input.document_id,
            ordinal: input.ordinal,
            text: input.text,
            content_hash,
            embedding,
            metadata: input.metadata,
            inserted_at: Utc::now(),
            version: 0,
        }
    }
}

/// A source document: an ordered collection of chunk ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub chunk_ids: Vec<ChunkId>,
}

/// Result of an ingest call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub chunk_id: ChunkId,
    /// False when identical content already existed.
    pub created: bool,
    /// False when the embedding had zero magnitude and was kept out of the
    /// vector index.
    pub indexed_vector: bool,
}

#[cfg(test)]
#[path = "chunk_tests.rs"]
mod tests;
