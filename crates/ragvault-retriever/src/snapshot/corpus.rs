//! Immutable, versioned corpus statistics used for BM25 scoring.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use ragvault_protocols::{ChangeSet, Chunk, ChunkId, RetrievalError};

use crate::tokenizer::Tokenizer;

/// Chunks processed between cancellation checks.
pub(crate) const CANCEL_CHECK_INTERVAL: usize = 256;

/// Per-chunk term statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub term_freqs: HashMap<String, u32>,
    /// Token count of the chunk.
    pub length: u32,
    /// Store version of the insert that created the chunk.
    pub version: u64,
}

impl SnapshotEntry {
    pub fn from_tokens(tokens: Vec<String>, version: u64) -> Self {
        let length = tokens.len() as u32;
        let mut term_freqs = HashMap::new();
        for token in tokens {
            *term_freqs.entry(token).or_insert(0) += 1;
        }
        Self {
            term_freqs,
            length,
            version,
        }
    }

    pub fn from_chunk(chunk: &Chunk, tokenizer: &Tokenizer) -> Self {
        Self::from_tokens(tokenizer.tokenize(&chunk.text), chunk.version)
    }

    pub fn term_frequency(&self, term: &str) -> u32 {
        self.term_freqs.get(term).copied().unwrap_or(0)
    }
}

/// A versioned view of the corpus: `{chunk_id -> term stats}` plus the
/// aggregates BM25 needs. `version` equals the store mutation counter the
/// view was captured at.
#[derive(Debug, Clone)]
pub struct CorpusSnapshot {
    version: u64,
    entries: HashMap<ChunkId, SnapshotEntry>,
    postings: HashMap<String, HashSet<ChunkId>>,
    total_length: u64,
    built_at: DateTime<Utc>,
}

impl CorpusSnapshot {
    pub fn empty(version: u64) -> Self {
        Self {
            version,
            entries: HashMap::new(),
            postings: HashMap::new(),
            total_length: 0,
            built_at: Utc::now(),
        }
    }

    /// Full single-pass build over `chunks`.
    pub fn build(
        version: u64,
        chunks: &[Chunk],
        tokenizer: &Tokenizer,
        cancel: &CancellationToken,
    ) -> Result<Self, RetrievalError> {
        let mut snapshot = Self::empty(version);
        snapshot.entries.reserve(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(RetrievalError::Cancelled);
            }
            snapshot.insert(chunk.id.clone(), SnapshotEntry::from_chunk(chunk, tokenizer));
        }
        snapshot.built_at = Utc::now();
        Ok(snapshot)
    }

    /// Apply a change set to a copy of this snapshot: removals first, then
    /// insertions.
    pub fn apply(
        &self,
        changes: &ChangeSet,
        tokenizer: &Tokenizer,
        cancel: &CancellationToken,
    ) -> Result<Self, RetrievalError> {
        let mut next = self.clone();
        for id in &changes.deleted {
            next.remove(id);
        }
        for (i, chunk) in changes.inserted.iter().enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(RetrievalError::Cancelled);
            }
            next.insert(chunk.id.clone(), SnapshotEntry::from_chunk(chunk, tokenizer));
        }
        next.version = changes.to_version.max(self.version);
        next.built_at = Utc::now();
        Ok(next)
    }

    fn insert(&mut self, id: ChunkId, entry: SnapshotEntry) {
        self.remove(&id);
        for term in entry.term_freqs.keys() {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(id.clone());
        }
        self.total_length += u64::from(entry.length);
        self.entries.insert(id, entry);
    }

    fn remove(&mut self, id: &ChunkId) -> bool {
        let Some(entry) = self.entries.remove(id) else {
            return false;
        };
        for term in entry.term_freqs.keys() {
            if let Some(ids) = self.postings.get_mut(term) {
                ids.remove(id);
                if ids.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        self.total_length -= u64::from(entry.length);
        true
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Total chunk count `N`.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &ChunkId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn entry(&self, id: &ChunkId) -> Option<&SnapshotEntry> {
        self.entries.get(id)
    }

    /// Chunks containing `term`.
    pub fn postings(&self, term: &str) -> Option<&HashSet<ChunkId>> {
        self.postings.get(term)
    }

    pub fn document_frequency(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, HashSet::len)
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Average chunk length in tokens; 0.0 for an empty snapshot.
    pub fn average_length(&self) -> f64 {
        if self.entries.is_empty() {
            0.0
        } else {
            self.total_length as f64 / self.entries.len() as f64
        }
    }

    /// Distinct terms in the vocabulary.
    pub fn vocabulary_size(&self) -> usize {
        self.postings.len()
    }
}

#[cfg(test)]
#[path = "corpus_tests.rs"]
mod tests;
