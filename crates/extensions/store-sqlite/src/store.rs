//! SQLite chunk store implementation.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use ragvault_protocols::{
    metadata_str, ChangeSet, Chunk, ChunkId, ChunkStore, Document, Embedding, Metadata,
    SnapshotMarker, StoreError, StoreScan, SOURCE_KEY,
};

use crate::schema::{init_schema, COUNTER_KEY, MARKER_KEY};

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

/// Change-log rows kept by default.
pub const DEFAULT_CHANGE_LOG_CAPACITY: usize = 10_000;

const CHUNK_COLUMNS: &str =
    "id, document_id, ordinal, text, content_hash, embedding, metadata, inserted_at, version";

/// SQLite-backed chunk store. Every mutation, its counter bump and its
/// change-log row commit in one transaction.
pub struct SqliteChunkStore {
    conn: Connection,
    path: Option<PathBuf>,
    change_log_capacity: usize,
}

enum Inserted {
    Stored(ChunkId),
    Duplicate(ChunkId),
}

fn store_error(err: tokio_rusqlite::Error) -> StoreError {
    match err {
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::FromSqlConversionFailure(_, _, e)) => {
            StoreError::Serialization(e.to_string())
        }
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn conversion(
    column: usize,
    ty: Type,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, ty, err.into())
}

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    let embedding = match row.get::<_, Option<Vec<u8>>>(5)? {
        Some(bytes) => Some(
            Embedding::from_le_bytes(&bytes)
                .ok_or_else(|| conversion(5, Type::Blob, "ragged embedding blob"))?,
        ),
        None => None,
    };
    let metadata: Metadata = serde_json::from_str(&row.get::<_, String>(6)?)
        .map_err(|e| conversion(6, Type::Text, e))?;
    let inserted_at = DateTime::parse_from_rfc3339(&row.get::<_, String>(7)?)
        .map_err(|e| conversion(7, Type::Text, e))?
        .with_timezone(&Utc);

    Ok(Chunk {
        id: ChunkId::from_string(row.get::<_, String>(0)?),
        document_id: row.get(1)?,
        ordinal: row.get(2)?,
        text: row.get(3)?,
        content_hash: row.get(4)?,
        embedding,
        metadata,
        inserted_at,
        version: row.get::<_, i64>(8)? as u64,
    })
}

fn read_counter(conn: &rusqlite::Connection) -> rusqlite::Result<u64> {
    let value: i64 = conn.query_row(
        "SELECT CAST(value AS INTEGER) FROM store_meta WHERE key = ?1",
        [COUNTER_KEY],
        |row| row.get(0),
    )?;
    Ok(value as u64)
}

/// Bump the counter and append the change-log row, pruning rows that fall
/// outside the retained window.
fn record_mutation(
    conn: &rusqlite::Connection,
    op: &str,
    chunk_id: &str,
    capacity: usize,
) -> rusqlite::Result<u64> {
    let next = read_counter(conn)? + 1;
    conn.execute(
        "UPDATE store_meta SET value = ?1 WHERE key = ?2",
        params![next.to_string(), COUNTER_KEY],
    )?;
    conn.execute(
        "INSERT INTO mutations (version, op, chunk_id) VALUES (?1, ?2, ?3)",
        params![next as i64, op, chunk_id],
    )?;
    conn.execute(
        "DELETE FROM mutations WHERE version <= ?1",
        [next.saturating_sub(capacity as u64) as i64],
    )?;
    Ok(next)
}

fn fetch_chunk(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Chunk>> {
    conn.query_row(
        &format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id = ?1"),
        [id],
        row_to_chunk,
    )
    .optional()
}

impl SqliteChunkStore {
    /// Open an in-memory database (tests and scratch use).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        conn.call(|conn| Ok(init_schema(conn)?))
            .await
            .map_err(store_error)?;

        Ok(Self {
            conn,
            path: None,
            change_log_capacity: DEFAULT_CHANGE_LOG_CAPACITY,
        })
    }

    /// Open (or create) a file-backed database.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
        }

        let conn = Connection::open(path.clone())
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        conn.call(|conn| Ok(init_schema(conn)?))
            .await
            .map_err(store_error)?;

        info!(path = %path.display(), "opened sqlite chunk store");
        Ok(Self {
            conn,
            path: Some(path),
            change_log_capacity: DEFAULT_CHANGE_LOG_CAPACITY,
        })
    }

    /// Retain `capacity` change-log rows.
    pub fn with_change_log_capacity(mut self, capacity: usize) -> Self {
        self.change_log_capacity = capacity;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    fn id(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, chunk: Chunk) -> Result<ChunkId, StoreError> {
        let metadata = serde_json::to_string(&chunk.metadata)?;
        let source = metadata_str(&chunk.metadata, SOURCE_KEY).map(str::to_string);
        let embedding = chunk.embedding.as_ref().map(Embedding::to_le_bytes);
        let inserted_at = chunk.inserted_at.to_rfc3339();
        let capacity = self.change_log_capacity;

        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let existing: Option<String> = tx
                    .query_row(
                        "SELECT id FROM chunks
                         WHERE id = ?1 OR (document_id = ?2 AND ordinal = ?3 AND content_hash = ?4)",
                        params![chunk.id.as_str(), chunk.document_id, chunk.ordinal, chunk.content_hash],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(existing) = existing {
                    return Ok(Inserted::Duplicate(ChunkId::from_string(existing)));
                }

                let version = record_mutation(&tx, "insert", chunk.id.as_str(), capacity)?;
                tx.execute(
                    &format!("INSERT INTO chunks ({CHUNK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                    params![
                        chunk.id.as_str(),
                        chunk.document_id,
                        chunk.ordinal,
                        chunk.text,
                        chunk.content_hash,
                        embedding,
                        metadata,
                        inserted_at,
                        version as i64
                    ],
                )?;
                tx.execute(
                    "INSERT OR IGNORE INTO documents (id, source) VALUES (?1, ?2)",
                    params![chunk.document_id, source],
                )?;

                tx.commit()?;
                Ok(Inserted::Stored(chunk.id))
            })
            .await
            .map_err(store_error)?;

        match outcome {
            Inserted::Stored(id) => Ok(id),
            Inserted::Duplicate(existing) => Err(StoreError::DuplicateContent { existing }),
        }
    }

    async fn delete(&self, id: &ChunkId) -> Result<bool, StoreError> {
        let id = id.as_str().to_string();
        let capacity = self.change_log_capacity;
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let document_id: Option<String> = tx
                    .query_row("SELECT document_id FROM chunks WHERE id = ?1", [&id], |row| {
                        row.get(0)
                    })
                    .optional()?;
                let Some(document_id) = document_id else {
                    return Ok(false);
                };

                tx.execute("DELETE FROM chunks WHERE id = ?1", [&id])?;
                record_mutation(&tx, "delete", &id, capacity)?;
                tx.execute(
                    "DELETE FROM documents WHERE id = ?1
                     AND NOT EXISTS (SELECT 1 FROM chunks WHERE document_id = ?1)",
                    [&document_id],
                )?;

                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(store_error)
    }

    async fn get(&self, id: &ChunkId) -> Result<Chunk, StoreError> {
        let key = id.as_str().to_string();
        self.conn
            .call(move |conn| Ok(fetch_chunk(conn, &key)?))
            .await
            .map_err(store_error)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn get_many(&self, ids: &[ChunkId]) -> Result<HashMap<ChunkId, Chunk>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids = ids.to_vec();
        self.conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare_cached(&format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id = ?1"))?;
                let mut found = HashMap::with_capacity(ids.len());
                for id in ids {
                    if let Some(chunk) = stmt.query_row([id.as_str()], row_to_chunk).optional()? {
                        found.insert(id, chunk);
                    }
                }
                Ok(found)
            })
            .await
            .map_err(store_error)
    }

    async fn scan(&self) -> Result<StoreScan, StoreError> {
        self.conn
            .call(|conn| {
                let tx = conn.transaction()?;
                let version = read_counter(&tx)?;
                let chunks = {
                    let mut stmt =
                        tx.prepare(&format!("SELECT {CHUNK_COLUMNS} FROM chunks ORDER BY id"))?;
                    let rows = stmt.query_map([], row_to_chunk)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                };
                tx.commit()?;
                Ok(StoreScan { version, chunks })
            })
            .await
            .map_err(store_error)
    }

    async fn changes_since(&self, version: u64) -> Result<Option<ChangeSet>, StoreError> {
        let changes = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let counter = read_counter(&tx)?;
                if version >= counter {
                    return Ok(Some(ChangeSet {
                        from_version: version,
                        to_version: counter,
                        ..Default::default()
                    }));
                }

                let oldest: Option<i64> =
                    tx.query_row("SELECT MIN(version) FROM mutations", [], |row| row.get(0))?;
                if oldest.is_none_or(|oldest| oldest as u64 > version + 1) {
                    return Ok(None);
                }

                let mut inserted = BTreeSet::new();
                let mut deleted = BTreeSet::new();
                {
                    let mut stmt = tx.prepare(
                        "SELECT op, chunk_id FROM mutations WHERE version > ?1 ORDER BY version",
                    )?;
                    let rows = stmt.query_map([version as i64], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?;
                    for row in rows {
                        let (op, chunk_id) = row?;
                        if op == "insert" {
                            inserted.insert(chunk_id);
                        } else {
                            deleted.insert(chunk_id);
                        }
                    }
                }

                let mut chunks = Vec::with_capacity(inserted.len());
                for id in &inserted {
                    if let Some(chunk) = fetch_chunk(&tx, id)? {
                        chunks.push(chunk);
                    }
                }
                tx.commit()?;

                Ok(Some(ChangeSet {
                    from_version: version,
                    to_version: counter,
                    inserted: chunks,
                    deleted: deleted.into_iter().map(ChunkId::from_string).collect(),
                }))
            })
            .await
            .map_err(store_error)?;

        if changes.is_none() {
            debug!(version, "change log does not reach requested version");
        }
        Ok(changes)
    }

    async fn mutation_counter(&self) -> Result<u64, StoreError> {
        self.conn
            .call(|conn| Ok(read_counter(conn)?))
            .await
            .map_err(store_error)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.conn
            .call(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(store_error)
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        let document_id = document_id.to_string();
        self.conn
            .call(move |conn| {
                let source: Option<Option<String>> = conn
                    .query_row(
                        "SELECT source FROM documents WHERE id = ?1",
                        [&document_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(source) = source else {
                    return Ok(None);
                };

                let mut stmt = conn.prepare(
                    "SELECT id FROM chunks WHERE document_id = ?1 ORDER BY ordinal, id",
                )?;
                let chunk_ids = stmt
                    .query_map([&document_id], |row| row.get::<_, String>(0))?
                    .map(|id| id.map(ChunkId::from_string))
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                Ok(Some(Document {
                    id: document_id,
                    source,
                    chunk_ids,
                }))
            })
            .await
            .map_err(store_error)
    }

    async fn snapshot_marker(&self) -> Result<Option<SnapshotMarker>, StoreError> {
        let raw: Option<String> = self
            .conn
            .call(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT value FROM store_meta WHERE key = ?1",
                        [MARKER_KEY],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await
            .map_err(store_error)?;

        raw.map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn record_snapshot_marker(&self, marker: SnapshotMarker) -> Result<(), StoreError> {
        let value = serde_json::to_string(&marker)?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![MARKER_KEY, value],
                )?;
                Ok(())
            })
            .await
            .map_err(store_error)
    }
}
