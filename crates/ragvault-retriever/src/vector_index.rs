//! Brute-force cosine vector index.
//!
//! Vectors are stored pre-normalized so a search is a dot product per entry.
//! Removal is two-phase: `remove` records a pending removal that every
//! `search` filters out, and `vacuum` physically drops pending entries once
//! they exceed a fraction of the index.
//!
//! Writes made through another retriever reach the index through
//! [`VectorIndex::apply_changes`] and [`VectorIndex::reconcile`], which replay
//! the store's change log or a full scan onto it.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::{debug, warn};

use ragvault_protocols::{ChangeSet, Chunk, ChunkId, Embedding, RetrievalError};

/// Vector index configuration.
#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    /// Fixed dimension for this index epoch.
    pub dimension: usize,
    /// Pending-removal ratio that triggers an automatic vacuum.
    pub vacuum_threshold: f32,
}

impl VectorIndexConfig {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vacuum_threshold: 0.25,
        }
    }
}

/// Outcome of [`VectorIndex::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorUpsert {
    Inserted,
    Replaced,
    /// Zero-magnitude vector: counted, never indexed.
    SkippedZero,
}

/// What a change-log or scan replay did to the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VectorSync {
    /// Stored embeddings that were missing and are now searchable.
    pub added: usize,
    /// Entries for chunks the store no longer has.
    pub removed: usize,
    /// Stored embeddings rejected for having the wrong dimension.
    pub skipped: usize,
}

impl VectorSync {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug)]
struct Entry {
    unit: Vec<f32>,
    version: u64,
}

#[derive(Debug, Default)]
struct IndexState {
    entries: HashMap<ChunkId, Entry>,
    pending_removals: HashSet<ChunkId>,
    /// Chunks stored without a usable vector, with the version that stored them.
    zero_vectors: HashMap<ChunkId, u64>,
}

impl IndexState {
    fn is_live(&self, id: &ChunkId) -> bool {
        self.entries.contains_key(id) && !self.pending_removals.contains(id)
    }

    fn place(&mut self, id: ChunkId, embedding: &Embedding, version: u64) -> VectorUpsert {
        let magnitude = embedding.magnitude();
        self.pending_removals.remove(&id);

        if magnitude == 0.0 || !magnitude.is_finite() {
            self.entries.remove(&id);
            self.zero_vectors.insert(id, version);
            return VectorUpsert::SkippedZero;
        }

        self.zero_vectors.remove(&id);
        let unit = embedding.vector.iter().map(|v| v / magnitude).collect();
        match self.entries.insert(id, Entry { unit, version }) {
            Some(_) => VectorUpsert::Replaced,
            None => VectorUpsert::Inserted,
        }
    }

    fn place_zero(&mut self, id: ChunkId, version: u64) {
        self.entries.remove(&id);
        self.pending_removals.remove(&id);
        self.zero_vectors.insert(id, version);
    }

    /// Drop `id` if whatever the index holds for it was written at or
    /// before `bound`. Returns true when a live entry was removed.
    fn retire(&mut self, id: &ChunkId, bound: u64) -> bool {
        if self.zero_vectors.get(id).is_some_and(|v| *v <= bound) {
            self.zero_vectors.remove(id);
        }
        let live = self
            .entries
            .get(id)
            .is_some_and(|entry| entry.version <= bound)
            && !self.pending_removals.contains(id);
        if live {
            self.pending_removals.insert(id.clone());
        }
        live
    }

    /// Bring one stored chunk into the index unless it is already there.
    fn adopt(&mut self, chunk: &Chunk, dimension: usize, sync: &mut VectorSync) {
        match &chunk.embedding {
            Some(embedding) if embedding.vector.len() != dimension => {
                warn!(
                    chunk = chunk.id.short(),
                    expected = dimension,
                    actual = embedding.vector.len(),
                    "stored embedding has the wrong dimension, not indexed"
                );
                sync.skipped += 1;
            }
            Some(embedding) => {
                if !self.is_live(&chunk.id)
                    && self.place(chunk.id.clone(), embedding, chunk.version)
                        != VectorUpsert::SkippedZero
                {
                    sync.added += 1;
                }
            }
            None => {
                if !self.zero_vectors.contains_key(&chunk.id) {
                    self.place_zero(chunk.id.clone(), chunk.version);
                }
            }
        }
    }
}

/// In-memory nearest-neighbour index over chunk embeddings.
#[derive(Debug)]
pub struct VectorIndex {
    config: VectorIndexConfig,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    pub fn new(config: VectorIndexConfig) -> Self {
        Self {
            config,
            state: RwLock::new(IndexState::default()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn check_dimension(&self, embedding: &Embedding) -> Result<(), RetrievalError> {
        let actual = embedding.vector.len();
        if actual != self.config.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.config.dimension,
                actual,
            });
        }
        Ok(())
    }

    /// Insert or replace an embedding. `version` is the store mutation that
    /// created the chunk; searches ignore entries newer than their read version.
    pub fn upsert(
        &self,
        id: ChunkId,
        embedding: &Embedding,
        version: u64,
    ) -> Result<VectorUpsert, RetrievalError> {
        self.check_dimension(embedding)?;
        Ok(self.state.write().place(id, embedding, version))
    }

    /// Record a chunk stored without an embedding.
    pub fn mark_zero(&self, id: ChunkId, version: u64) {
        self.state.write().place_zero(id, version);
    }

    /// Remove an id. Returns true if a live entry was removed.
    pub fn remove(&self, id: &ChunkId) -> bool {
        let mut state = self.state.write();
        state.zero_vectors.remove(id);

        let live = state.entries.contains_key(id) && state.pending_removals.insert(id.clone());
        if live && self.over_threshold(&state) {
            let purged = Self::purge(&mut state);
            debug!(purged, "vector index vacuumed");
        }
        live
    }

    fn over_threshold(&self, state: &IndexState) -> bool {
        let total = state.entries.len();
        total > 0 && state.pending_removals.len() as f32 > self.config.vacuum_threshold * total as f32
    }

    fn purge(state: &mut IndexState) -> usize {
        let pending = std::mem::take(&mut state.pending_removals);
        let mut purged = 0;
        for id in pending {
            if state.entries.remove(&id).is_some() {
                purged += 1;
            }
        }
        purged
    }

    /// Physically drop pending removals. Returns how many entries were purged.
    pub fn vacuum(&self) -> usize {
        Self::purge(&mut self.state.write())
    }

    /// Replay a store change log onto the index. Deletions are applied
    /// before insertions, and nothing written after `changes.to_version` is
    /// touched.
    pub fn apply_changes(&self, changes: &ChangeSet) -> VectorSync {
        let mut sync = VectorSync::default();
        let mut state = self.state.write();
        for id in &changes.deleted {
            if state.retire(id, changes.to_version) {
                sync.removed += 1;
            }
        }
        for chunk in &changes.inserted {
            state.adopt(chunk, self.config.dimension, &mut sync);
        }
        self.finish_sync(&mut state, sync)
    }

    /// Make the index agree with a full scan taken at `version`. Entries
    /// newer than the scan are kept.
    pub fn reconcile(&self, version: u64, chunks: &[Chunk]) -> VectorSync {
        let mut sync = VectorSync::default();
        let stored: HashSet<&ChunkId> = chunks.iter().map(|c| &c.id).collect();
        let mut state = self.state.write();

        let gone: Vec<ChunkId> = state
            .entries
            .keys()
            .chain(state.zero_vectors.keys())
            .filter(|id| !stored.contains(id))
            .cloned()
            .collect();
        for id in &gone {
            if state.retire(id, version) {
                sync.removed += 1;
            }
        }
        for chunk in chunks {
            state.adopt(chunk, self.config.dimension, &mut sync);
        }
        self.finish_sync(&mut state, sync)
    }

    fn finish_sync(&self, state: &mut IndexState, sync: VectorSync) -> VectorSync {
        if sync.removed > 0 && self.over_threshold(state) {
            let purged = Self::purge(state);
            debug!(purged, "vector index vacuumed");
        }
        sync
    }

    /// Top-`k` ids by descending cosine similarity, ties by ascending id.
    /// Entries newer than `as_of` and pending removals are never returned.
    pub fn search(
        &self,
        query: &Embedding,
        k: usize,
        as_of: u64,
    ) -> Result<Vec<(ChunkId, f32)>, RetrievalError> {
        self.check_dimension(query)?;

        let magnitude = query.magnitude();
        if k == 0 || magnitude == 0.0 || !magnitude.is_finite() {
            return Ok(Vec::new());
        }
        let unit: Vec<f32> = query.vector.iter().map(|v| v / magnitude).collect();

        let state = self.state.read();
        let mut results: Vec<(ChunkId, f32)> = state
            .entries
            .iter()
            .filter(|(id, entry)| entry.version <= as_of && !state.pending_removals.contains(*id))
            .map(|(id, entry)| {
                let dot: f32 = unit.iter().zip(&entry.unit).map(|(a, b)| a * b).sum();
                (id.clone(), dot.clamp(-1.0, 1.0))
            })
            .collect();
        drop(state);

        results.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        results.truncate(k);
        Ok(results)
    }

    /// Whether `id` is currently searchable.
    pub fn contains(&self, id: &ChunkId) -> bool {
        self.state.read().is_live(id)
    }

    /// Searchable entries.
    pub fn len(&self) -> usize {
        let state = self.state.read();
        state.entries.len() - state.pending_removals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_removals(&self) -> usize {
        self.state.read().pending_removals.len()
    }

    /// Chunks kept out of the index because their embedding had no direction.
    pub fn zero_vector_count(&self) -> usize {
        self.state.read().zero_vectors.len()
    }

    pub fn clear(&self) {
        *self.state.write() = IndexState::default();
    }
}

#[cfg(test)]
#[path = "vector_index_tests.rs"]
mod tests;
