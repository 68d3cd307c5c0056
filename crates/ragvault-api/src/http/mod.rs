//! HTTP interface module.
//!
//! Provides REST API endpoints for:
//! - Chunk ingestion, lookup and deletion
//! - Hybrid, vector and keyword queries
//! - Snapshot administration, stats and health

pub mod handlers;
pub mod routes;
