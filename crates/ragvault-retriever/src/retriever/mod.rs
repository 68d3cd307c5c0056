//! The `HybridRetriever` facade.
//!
//! Coordinates the chunk store, the vector index, the keyword index and the
//! snapshot manager. Writes are serialized behind one writer lock; queries
//! capture the store counter at start and read every index as of that
//! version.
//!
//! The store may also be written by other retrievers (a CLI `ingest` next to
//! a running server). Snapshot rebuilds replay the store's change log onto
//! the vector index, and a vector-only query that sees mutations this
//! retriever did not make triggers that catch-up first.

mod query;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use ragvault_protocols::{
    validate_metadata, Chunk, ChunkId, ChunkInput, ChunkStore, Embedding, EmbeddingProvider,
    IngestOutcome, Metadata, RetrievalError, RetrieverStats, StaleIndexWarning, StoreError,
};

use crate::bm25::{Bm25Config, KeywordIndex};
use crate::fusion::{FusionConfig, FusionEngine};
use crate::snapshot::{RebuildReport, SnapshotConfig, SnapshotManager};
use crate::tokenizer::Tokenizer;
use crate::vector_index::{VectorIndex, VectorIndexConfig, VectorUpsert};

/// Default candidate over-fetch factor per source.
pub const DEFAULT_FETCH_MULTIPLIER: usize = 4;

/// Runtime configuration for [`HybridRetriever`].
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Each source returns `top_k * fetch_multiplier` candidates.
    pub fetch_multiplier: usize,
    pub fusion: FusionConfig,
    pub bm25: Bm25Config,
    pub tokenizer: Tokenizer,
    pub snapshot: SnapshotConfig,
    /// Pending-removal ratio that triggers a vector index vacuum.
    pub vacuum_threshold: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            fetch_multiplier: DEFAULT_FETCH_MULTIPLIER,
            fusion: FusionConfig::default(),
            bm25: Bm25Config::default(),
            tokenizer: Tokenizer::new(),
            snapshot: SnapshotConfig::default(),
            vacuum_threshold: 0.25,
        }
    }
}

/// Hybrid vector + BM25 retriever over one chunk store.
pub struct HybridRetriever {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<VectorIndex>,
    keyword: KeywordIndex,
    fusion: FusionEngine,
    snapshots: SnapshotManager,
    writer: Mutex<()>,
    /// Highest version up to which every store mutation is in the vector
    /// index through this retriever's own writes.
    vectors_synced: AtomicU64,
    fetch_multiplier: usize,
}

impl HybridRetriever {
    /// Open a retriever over `store`, rebuilding the vector index from the
    /// embeddings the store already holds.
    pub async fn open(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrieverConfig,
    ) -> Result<Self, RetrievalError> {
        let dimension = embedder.dimension();
        let vectors = Arc::new(VectorIndex::new(VectorIndexConfig {
            dimension,
            vacuum_threshold: config.vacuum_threshold,
        }));

        let scan = store.scan().await?;
        for chunk in &scan.chunks {
            match &chunk.embedding {
                Some(embedding) => {
                    vectors.upsert(chunk.id.clone(), embedding, chunk.version)?;
                }
                None => vectors.mark_zero(chunk.id.clone(), chunk.version),
            }
        }

        let snapshots = SnapshotManager::with_vector_index(
            store.clone(),
            config.tokenizer.clone(),
            config.snapshot.clone(),
            vectors.clone(),
        );
        if let Some(marker) = snapshots.load_marker().await? {
            if marker.version > scan.version {
                warn!(
                    marker = marker.version,
                    store = scan.version,
                    "persisted snapshot marker is ahead of the store counter"
                );
            }
        }

        let version = scan.version;
        let chunk_count = scan.chunks.len();
        if config.snapshot.warm_on_start {
            snapshots.prime(scan).await?;
        } else {
            snapshots.observe(version);
        }

        info!(
            store = store.id(),
            embedder = embedder.name(),
            dimension,
            chunks = chunk_count,
            version,
            "retriever opened"
        );

        Ok(Self {
            store,
            embedder,
            vectors,
            vectors_synced: AtomicU64::new(version),
            keyword: KeywordIndex::new(config.bm25, config.tokenizer),
            fusion: FusionEngine::new(config.fusion),
            snapshots,
            writer: Mutex::new(()),
            fetch_multiplier: config.fetch_multiplier.max(1),
        })
    }

    /// Embedding dimension of this index epoch.
    pub fn dimension(&self) -> usize {
        self.vectors.dimension()
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    /// Ingest text, reading `document_id` and `ordinal` from `metadata`.
    pub async fn ingest(&self, text: &str, metadata: Metadata) -> Result<ChunkId, RetrievalError> {
        let outcome = self
            .ingest_chunk(ChunkInput::from_metadata(text, metadata))
            .await?;
        Ok(outcome.chunk_id)
    }

    /// Ingest one chunk. Re-ingesting identical content is a successful
    /// no-op reported with `created: false`, which also restores the chunk's
    /// vector entry if an earlier attempt stopped after the store commit.
    pub async fn ingest_chunk(&self, input: ChunkInput) -> Result<IngestOutcome, RetrievalError> {
        validate_metadata(&input.metadata)?;

        if let Some(outcome) = self.replay(&input.chunk_id()).await? {
            return Ok(outcome);
        }

        let embedding = self.embedder.embed(&input.text).await?;
        self.store_embedded(input, embedding).await
    }

    /// Ingest several chunks, embedding all new content in one provider
    /// call. Outcomes are returned in input order.
    pub async fn ingest_batch(
        &self,
        inputs: Vec<ChunkInput>,
    ) -> Result<Vec<IngestOutcome>, RetrievalError> {
        for input in &inputs {
            validate_metadata(&input.metadata)?;
        }

        let mut outcomes: Vec<Option<IngestOutcome>> = vec![None; inputs.len()];
        let mut pending = Vec::new();
        for (position, input) in inputs.into_iter().enumerate() {
            match self.replay(&input.chunk_id()).await? {
                Some(outcome) => outcomes[position] = Some(outcome),
                None => pending.push((position, input)),
            }
        }

        if !pending.is_empty() {
            let texts: Vec<&str> = pending.iter().map(|(_, input)| input.text.as_str()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            if embeddings.len() != pending.len() {
                return Err(RetrievalError::EmbeddingUnavailable(format!(
                    "provider returned {} embeddings for {} texts",
                    embeddings.len(),
                    pending.len()
                )));
            }
            for ((position, input), embedding) in pending.into_iter().zip(embeddings) {
                outcomes[position] = Some(self.store_embedded(input, embedding).await?);
            }
        }

        let outcomes: Vec<IngestOutcome> = outcomes.into_iter().flatten().collect();
        debug!(
            chunks = outcomes.len(),
            created = outcomes.iter().filter(|o| o.created).count(),
            "batch ingested"
        );
        Ok(outcomes)
    }

    /// Outcome for content that is already stored, or `None` when it is not.
    async fn replay(&self, id: &ChunkId) -> Result<Option<IngestOutcome>, RetrievalError> {
        if self.find(id).await?.is_none() {
            return Ok(None);
        }

        // Re-read under the writer lock so a concurrent delete cannot be undone.
        let _guard = self.writer.lock().await;
        match self.find(id).await? {
            Some(existing) => {
                debug!(chunk = id.short(), "content already stored");
                self.restore_vector(existing).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn find(&self, id: &ChunkId) -> Result<Option<Chunk>, RetrievalError> {
        match self.store.get(id).await {
            Ok(chunk) => Ok(Some(chunk)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Put a stored chunk back into the vector index if it is missing.
    /// Caller holds the writer lock.
    fn restore_vector(&self, existing: Chunk) -> Result<IngestOutcome, RetrievalError> {
        match &existing.embedding {
            Some(embedding) if !self.vectors.contains(&existing.id) => {
                let placed = self
                    .vectors
                    .upsert(existing.id.clone(), embedding, existing.version)?;
                if placed != VectorUpsert::SkippedZero {
                    info!(
                        chunk = existing.id.short(),
                        version = existing.version,
                        "restored missing vector entry"
                    );
                }
            }
            Some(_) => {}
            None => self.vectors.mark_zero(existing.id.clone(), existing.version),
        }

        let indexed_vector = self.vectors.contains(&existing.id);
        Ok(IngestOutcome {
            chunk_id: existing.id,
            created: false,
            indexed_vector,
        })
    }

    /// Store a chunk whose embedding is already computed and index it.
    async fn store_embedded(
        &self,
        input: ChunkInput,
        embedding: Embedding,
    ) -> Result<IngestOutcome, RetrievalError> {
        if embedding.vector.len() != self.dimension() {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension(),
                actual: embedding.vector.len(),
            });
        }
        let magnitude = embedding.magnitude();
        let indexable = magnitude > 0.0 && magnitude.is_finite();
        let chunk = Chunk::from_input(input, indexable.then_some(embedding));

        let _guard = self.writer.lock().await;
        // Writes are serialized here, so the insert gets exactly the next value.
        let version = self.store.mutation_counter().await? + 1;
        let embedding = chunk.embedding.clone();
        let id = match self.store.insert(chunk).await {
            Ok(id) => id,
            Err(StoreError::DuplicateContent { existing }) => {
                debug!(chunk = existing.short(), "duplicate content on insert");
                let existing = self.store.get(&existing).await?;
                return self.restore_vector(existing);
            }
            Err(err) => return Err(err.into()),
        };

        let indexed_vector = match &embedding {
            Some(embedding) => {
                self.vectors.upsert(id.clone(), embedding, version)? != VectorUpsert::SkippedZero
            }
            None => {
                self.vectors.mark_zero(id.clone(), version);
                false
            }
        };
        self.advance_vectors_synced(version);
        self.snapshots.notify_mutation(version);

        debug!(chunk = id.short(), version, indexed_vector, "chunk ingested");
        Ok(IngestOutcome {
            chunk_id: id,
            created: true,
            indexed_vector,
        })
    }

    /// Record that this retriever's own write at `version` is indexed. Only
    /// moves when no other writer slipped a mutation in before it.
    fn advance_vectors_synced(&self, version: u64) {
        let _ = self.vectors_synced.compare_exchange(
            version.saturating_sub(1),
            version,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Version up to which the vector index reflects every store mutation.
    pub(crate) fn vectors_current_through(&self) -> u64 {
        let own = self.vectors_synced.load(Ordering::Acquire);
        own.max(self.snapshots.snapshot_version().unwrap_or(0))
    }

    /// Delete a chunk from the store and both indexes.
    pub async fn delete(&self, id: &ChunkId) -> Result<bool, RetrievalError> {
        let _guard = self.writer.lock().await;
        let version = self.store.mutation_counter().await? + 1;
        let removed = self.store.delete(id).await?;
        self.vectors.remove(id);
        if removed {
            self.advance_vectors_synced(version);
            self.snapshots.notify_mutation(version);
            debug!(chunk = id.short(), version, "chunk deleted");
        }
        Ok(removed)
    }

    /// Delete every chunk of a document. Returns how many were removed.
    pub async fn delete_document(&self, document_id: &str) -> Result<usize, RetrievalError> {
        let Some(document) = self.store.get_document(document_id).await? else {
            return Ok(0);
        };

        let mut removed = 0;
        for id in &document.chunk_ids {
            if self.delete(id).await? {
                removed += 1;
            }
        }
        info!(document = document_id, removed, "document deleted");
        Ok(removed)
    }

    pub async fn get(&self, id: &ChunkId) -> Result<Chunk, RetrievalError> {
        Ok(self.store.get(id).await?)
    }

    /// Explicitly bring the keyword snapshot up to the store's version.
    pub async fn warm_up(&self) -> Result<Option<StaleIndexWarning>, RetrievalError> {
        Ok(self.snapshots.warm_up().await?.warning)
    }

    /// Rebuild the keyword snapshot now and vacuum the vector index.
    pub async fn rebuild(&self) -> Result<RebuildReport, RetrievalError> {
        let report = self.snapshots.rebuild_now().await?;
        let purged = self.vectors.vacuum();
        if purged > 0 {
            debug!(purged, "vector index vacuumed");
        }
        Ok(report)
    }

    pub async fn stats(&self) -> Result<RetrieverStats, RetrievalError> {
        let store_version = self.store.mutation_counter().await?;
        let chunk_count = self.store.count().await?;
        self.snapshots.observe(store_version);
        let last_rebuild = self.snapshots.last_rebuild();

        Ok(RetrieverStats {
            chunk_count,
            index_freshness: self.snapshots.state(),
            snapshot_version: self.snapshots.snapshot_version(),
            store_version,
            last_rebuild_duration_ms: last_rebuild
                .as_ref()
                .map(|r| r.duration.as_millis() as u64),
            last_rebuild_kind: last_rebuild.as_ref().map(|r| r.kind),
            vector_entries: self.vectors.len(),
            vector_pending_removals: self.vectors.pending_removals(),
            zero_vector_chunks: self.vectors.zero_vector_count(),
            dimension: self.dimension(),
            persisted_snapshot_version: self.snapshots.persisted_marker().map(|m| m.version),
        })
    }

    /// Cancel background rebuilds.
    pub fn shutdown(&self) {
        self.snapshots.shutdown();
        info!("retriever shut down");
    }
}

#[cfg(test)]
#[path = "retriever_tests.rs"]
mod tests;
