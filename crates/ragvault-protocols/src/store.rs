//! Chunk store protocol definitions.
//!
//! The chunk store is the source of truth for which chunks exist. Every
//! successful insert or delete bumps a monotonic mutation counter by exactly
//! one, in the same atomic unit as the data change and its change-log record.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::{Chunk, ChunkId, Document};

/// One consistent read of the whole store.
#[derive(Debug, Clone)]
pub struct StoreScan {
    /// Mutation counter the chunk set corresponds to.
    pub version: u64,
    pub chunks: Vec<Chunk>,
}

/// Net changes between two counter values.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub from_version: u64,
    pub to_version: u64,
    /// Chunks inserted after `from_version` that still exist at `to_version`.
    pub inserted: Vec<Chunk>,
    /// Ids deleted after `from_version`.
    pub deleted: Vec<ChunkId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.deleted.is_empty()
    }
}

/// Persisted freshness marker written after each snapshot rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMarker {
    pub version: u64,
    pub built_at: DateTime<Utc>,
    pub chunk_count: usize,
}

/// Core trait for chunk stores.
///
/// Several retrievers may write one store (a server plus CLI ingests against
/// the same file). Each one learns about the others' writes only through
/// [`ChunkStore::changes_since`] or [`ChunkStore::scan`], so both must report
/// stored embeddings along with text.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Returns the store ID.
    fn id(&self) -> &str;

    /// Insert a chunk, assigning it the next mutation counter value.
    ///
    /// Fails with [`StoreError::DuplicateContent`] carrying the existing id
    /// when `(document_id, ordinal, content_hash)` is already stored.
    async fn insert(&self, chunk: Chunk) -> Result<ChunkId, StoreError>;

    /// Delete a chunk. Returns false (and does not count a mutation) when
    /// the id is absent.
    async fn delete(&self, id: &ChunkId) -> Result<bool, StoreError>;

    /// Fetch one chunk.
    async fn get(&self, id: &ChunkId) -> Result<Chunk, StoreError>;

    /// Fetch several chunks; missing ids are absent from the map.
    async fn get_many(&self, ids: &[ChunkId]) -> Result<HashMap<ChunkId, Chunk>, StoreError> {
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            match self.get(id).await {
                Ok(chunk) => {
                    found.insert(id.clone(), chunk);
                }
                Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }

    /// Every stored chunk.
    async fn list_all(&self) -> Result<Vec<Chunk>, StoreError> {
        Ok(self.scan().await?.chunks)
    }

    /// Every stored chunk together with the counter they correspond to.
    async fn scan(&self) -> Result<StoreScan, StoreError>;

    /// Changes after `version`, or `None` when the change log no longer
    /// reaches back that far.
    async fn changes_since(&self, version: u64) -> Result<Option<ChangeSet>, StoreError>;

    /// Current mutation counter.
    async fn mutation_counter(&self) -> Result<u64, StoreError>;

    /// Number of stored chunks.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Look up a document and its chunk ids.
    async fn get_document(&self, document_id: &str) -> Result<Option<Document>, StoreError>;

    /// Last recorded snapshot marker.
    async fn snapshot_marker(&self) -> Result<Option<SnapshotMarker>, StoreError>;

    /// Record a snapshot marker. Not a mutation.
    async fn record_snapshot_marker(&self, marker: SnapshotMarker) -> Result<(), StoreError>;
}
