//! Retrieval API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ragvault_protocols::{
    Chunk, ChunkId, ChunkInput, IngestOutcome, Metadata, QueryMode, QueryResponse, RebuildKind,
    RetrieverStats, SnapshotState,
};

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request / response types
// ============================================================================

/// Request to ingest one chunk.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub text: String,

    /// Flat scalar metadata. `document_id` and `ordinal` keys are honoured
    /// when the explicit fields are absent.
    #[serde(default)]
    pub metadata: Metadata,

    pub document_id: Option<String>,

    pub ordinal: Option<u32>,
}

impl IngestRequest {
    fn into_input(self) -> ChunkInput {
        let mut input = ChunkInput::from_metadata(self.text, self.metadata);
        if let Some(document_id) = self.document_id {
            input.document_id = document_id;
        }
        if let Some(ordinal) = self.ordinal {
            input.ordinal = ordinal;
        }
        input
    }
}

/// Request to ingest several chunks with one embedding call.
#[derive(Debug, Deserialize)]
pub struct BatchIngestRequest {
    pub chunks: Vec<IngestRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchIngestResponse {
    pub created: usize,
    pub outcomes: Vec<IngestOutcome>,
}

/// A stored chunk without its embedding.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChunkResponse {
    pub id: ChunkId,
    pub document_id: String,
    pub ordinal: u32,
    pub text: String,
    pub metadata: Metadata,
    pub version: u64,
    pub has_embedding: bool,
}

impl From<Chunk> for ChunkResponse {
    fn from(chunk: Chunk) -> Self {
        Self {
            has_embedding: chunk.embedding.is_some(),
            id: chunk.id,
            document_id: chunk.document_id,
            ordinal: chunk.ordinal,
            text: chunk.text,
            metadata: chunk.metadata,
            version: chunk.version,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteDocumentResponse {
    pub document_id: String,
    pub deleted: usize,
}

/// Query request. Omitted fields fall back to the server defaults.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub top_k: Option<usize>,
    pub mode: Option<QueryMode>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RebuildResponse {
    pub kind: RebuildKind,
    pub version: u64,
    pub chunk_count: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub index_freshness: SnapshotState,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /chunks
pub async fn ingest_chunk(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = request.into_input();
    let outcome = state.retry.ingest(&state.retriever, input).await?;

    let status = if outcome.created {
        info!(chunk = %outcome.chunk_id.short(), "chunk ingested");
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

/// POST /chunks/batch
pub async fn ingest_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchIngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.chunks.is_empty() {
        return Err(ApiError::BadRequest("chunks must not be empty".to_string()));
    }
    let inputs = request
        .chunks
        .into_iter()
        .map(IngestRequest::into_input)
        .collect();
    let outcomes = state.retry.ingest_batch(&state.retriever, inputs).await?;

    let created = outcomes.iter().filter(|o| o.created).count();
    info!(chunks = outcomes.len(), created, "batch ingested");
    let status = if created > 0 {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(BatchIngestResponse { created, outcomes })))
}

/// GET /chunks/{id}
pub async fn get_chunk(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ChunkResponse>, ApiError> {
    let chunk = state.retriever.get(&ChunkId::from(id)).await?;
    Ok(Json(chunk.into()))
}

/// DELETE /chunks/{id}
pub async fn delete_chunk(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let deleted = state.retriever.delete(&ChunkId::from(id)).await?;
    Ok(Json(DeleteResponse { deleted }))
}

/// DELETE /documents/{id}
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
) -> Result<Json<DeleteDocumentResponse>, ApiError> {
    let deleted = state.retriever.delete_document(&document_id).await?;
    Ok(Json(DeleteDocumentResponse {
        document_id,
        deleted,
    }))
}

/// POST /query
pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let top_k = request.top_k.unwrap_or(state.defaults.top_k);
    let mode = request.mode.unwrap_or(state.defaults.mode);
    debug!(top_k, %mode, "query request");

    let response = state.retriever.query(&request.query, top_k, mode).await?;
    Ok(Json(response))
}

/// GET /stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<RetrieverStats>, ApiError> {
    Ok(Json(state.retriever.stats().await?))
}

/// POST /snapshot/rebuild
pub async fn rebuild_snapshot(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RebuildResponse>, ApiError> {
    let report = state.retriever.rebuild().await?;
    Ok(Json(RebuildResponse {
        kind: report.kind,
        version: report.version,
        chunk_count: report.chunk_count,
        duration_ms: report.duration.as_millis() as u64,
    }))
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime().as_secs(),
        index_freshness: state.retriever.snapshots().state(),
    })
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
