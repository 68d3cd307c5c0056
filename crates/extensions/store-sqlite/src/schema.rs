//! Database schema management.

use rusqlite::Connection;
use tokio_rusqlite::Error;

pub const COUNTER_KEY: &str = "mutation_counter";
pub const MARKER_KEY: &str = "snapshot_marker";

/// Initialize the database schema.
pub fn init_schema(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

const SCHEMA: &str = r#"
-- Chunk records; embedding is NULL for zero-magnitude vectors
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    text TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    embedding BLOB,
    metadata TEXT NOT NULL DEFAULT '{}',
    inserted_at TEXT NOT NULL,
    version INTEGER NOT NULL,
    UNIQUE (document_id, ordinal, content_hash)
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id, ordinal);

CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    source TEXT
);

-- Change log, one row per counted mutation
CREATE TABLE IF NOT EXISTS mutations (
    version INTEGER PRIMARY KEY,
    op TEXT NOT NULL CHECK (op IN ('insert', 'delete')),
    chunk_id TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

INSERT OR IGNORE INTO store_meta (key, value) VALUES ('mutation_counter', '0');
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creation() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        for table in ["chunks", "documents", "mutations", "store_meta"] {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")
                .unwrap();
            assert!(stmt.exists([table]).unwrap(), "missing table {table}");
        }
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "UPDATE store_meta SET value = '7' WHERE key = ?1",
            [COUNTER_KEY],
        )
        .unwrap();
        init_schema(&conn).unwrap();

        let value: String = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = ?1",
                [COUNTER_KEY],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(value, "7");
    }
}
