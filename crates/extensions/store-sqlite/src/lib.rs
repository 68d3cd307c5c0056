//! SQLite chunk store for ragvault.
//!
//! One file holds chunk records, their embeddings (little-endian `f32`
//! BLOBs), the mutation change log and the snapshot freshness marker.

mod schema;
mod store;

pub use store::{SqliteChunkStore, DEFAULT_CHANGE_LOG_CAPACITY};
