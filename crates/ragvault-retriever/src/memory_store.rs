//! In-memory reference chunk store.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::RwLock;

use ragvault_protocols::{
    metadata_str, ChangeSet, Chunk, ChunkId, ChunkStore, Document, SnapshotMarker, StoreError,
    StoreScan, SOURCE_KEY,
};

/// Change-log records kept by default.
pub const DEFAULT_CHANGE_LOG_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeOp {
    Insert,
    Delete,
}

#[derive(Debug, Clone)]
struct ChangeRecord {
    version: u64,
    op: ChangeOp,
    chunk_id: ChunkId,
}

#[derive(Debug, Default)]
struct DocumentEntry {
    source: Option<String>,
    chunks: BTreeSet<(u32, ChunkId)>,
}

#[derive(Debug, Default)]
struct StoreState {
    chunks: HashMap<ChunkId, Chunk>,
    by_content: HashMap<(String, u32, String), ChunkId>,
    documents: BTreeMap<String, DocumentEntry>,
    counter: u64,
    log: VecDeque<ChangeRecord>,
    marker: Option<SnapshotMarker>,
}

impl StoreState {
    fn append(&mut self, op: ChangeOp, chunk_id: ChunkId, capacity: usize) -> u64 {
        self.counter += 1;
        if capacity > 0 {
            if self.log.len() == capacity {
                self.log.pop_front();
            }
            self.log.push_back(ChangeRecord {
                version: self.counter,
                op,
                chunk_id,
            });
        }
        self.counter
    }

    /// Oldest version `changes_since` can still answer for.
    fn oldest_reachable(&self) -> u64 {
        self.counter - self.log.len() as u64
    }
}

/// Chunk store kept entirely in memory. Useful for tests and ephemeral
/// deployments; every operation takes one lock so each mutation and its
/// counter bump are atomic.
pub struct MemoryChunkStore {
    id: String,
    change_log_capacity: usize,
    state: RwLock<StoreState>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANGE_LOG_CAPACITY)
    }

    pub fn with_capacity(change_log_capacity: usize) -> Self {
        Self {
            id: "memory".to_string(),
            change_log_capacity,
            state: RwLock::new(StoreState::default()),
        }
    }
}

impl Default for MemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

fn content_key(chunk: &Chunk) -> (String, u32, String) {
    (
        chunk.document_id.clone(),
        chunk.ordinal,
        chunk.content_hash.clone(),
    )
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn insert(&self, mut chunk: Chunk) -> Result<ChunkId, StoreError> {
        let mut state = self.state.write();

        let key = content_key(&chunk);
        if let Some(existing) = state.by_content.get(&key) {
            return Err(StoreError::DuplicateContent {
                existing: existing.clone(),
            });
        }
        if state.chunks.contains_key(&chunk.id) {
            return Err(StoreError::DuplicateContent {
                existing: chunk.id.clone(),
            });
        }

        let id = chunk.id.clone();
        chunk.version = state.append(ChangeOp::Insert, id.clone(), self.change_log_capacity);

        let document = state.documents.entry(chunk.document_id.clone()).or_default();
        if document.source.is_none() {
            document.source = metadata_str(&chunk.metadata, SOURCE_KEY).map(str::to_string);
        }
        document.chunks.insert((chunk.ordinal, id.clone()));

        state.by_content.insert(key, id.clone());
        state.chunks.insert(id.clone(), chunk);
        Ok(id)
    }

    async fn delete(&self, id: &ChunkId) -> Result<bool, StoreError> {
        let mut state = self.state.write();

        let Some(chunk) = state.chunks.remove(id) else {
            return Ok(false);
        };
        state.by_content.remove(&content_key(&chunk));
        if let Some(document) = state.documents.get_mut(&chunk.document_id) {
            document.chunks.remove(&(chunk.ordinal, id.clone()));
            if document.chunks.is_empty() {
                state.documents.remove(&chunk.document_id);
            }
        }
        state.append(ChangeOp::Delete, id.clone(), self.change_log_capacity);
        Ok(true)
    }

    async fn get(&self, id: &ChunkId) -> Result<Chunk, StoreError> {
        self.state
            .read()
            .chunks
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn get_many(&self, ids: &[ChunkId]) -> Result<HashMap<ChunkId, Chunk>, StoreError> {
        let state = self.state.read();
        Ok(ids
            .iter()
            .filter_map(|id| state.chunks.get(id).map(|c| (id.clone(), c.clone())))
            .collect())
    }

    async fn scan(&self) -> Result<StoreScan, StoreError> {
        let state = self.state.read();
        let mut chunks: Vec<Chunk> = state.chunks.values().cloned().collect();
        chunks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(StoreScan {
            version: state.counter,
            chunks,
        })
    }

    async fn changes_since(&self, version: u64) -> Result<Option<ChangeSet>, StoreError> {
        let state = self.state.read();
        if version >= state.counter {
            return Ok(Some(ChangeSet {
                from_version: version,
                to_version: state.counter,
                ..Default::default()
            }));
        }
        if version < state.oldest_reachable() {
            return Ok(None);
        }

        let mut inserted = BTreeSet::new();
        let mut deleted = BTreeSet::new();
        for record in state.log.iter().filter(|r| r.version > version) {
            match record.op {
                ChangeOp::Insert => inserted.insert(record.chunk_id.clone()),
                ChangeOp::Delete => deleted.insert(record.chunk_id.clone()),
            };
        }

        Ok(Some(ChangeSet {
            from_version: version,
            to_version: state.counter,
            inserted: inserted
                .into_iter()
                .filter_map(|id| state.chunks.get(&id).cloned())
                .collect(),
            deleted: deleted.into_iter().collect(),
        }))
    }

    async fn mutation_counter(&self) -> Result<u64, StoreError> {
        Ok(self.state.read().counter)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.state.read().chunks.len())
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        let state = self.state.read();
        Ok(state.documents.get(document_id).map(|entry| Document {
            id: document_id.to_string(),
            source: entry.source.clone(),
            chunk_ids: entry.chunks.iter().map(|(_, id)| id.clone()).collect(),
        }))
    }

    async fn snapshot_marker(&self) -> Result<Option<SnapshotMarker>, StoreError> {
        Ok(self.state.read().marker.clone())
    }

    async fn record_snapshot_marker(&self, marker: SnapshotMarker) -> Result<(), StoreError> {
        self.state.write().marker = Some(marker);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_store_tests.rs"]
mod tests;
