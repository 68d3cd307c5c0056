//! HTTP route definitions.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Create the API router.
///
/// ## Route Structure
///
/// ```text
/// POST   /chunks            - Ingest a chunk (201 created, 200 already stored)
/// POST   /chunks/batch      - Ingest several chunks with one embedding call
/// GET    /chunks/{id}       - Fetch a chunk
/// DELETE /chunks/{id}       - Delete a chunk
/// DELETE /documents/{id}    - Delete every chunk of a document
/// POST   /query             - Hybrid, vector or keyword query
/// GET    /stats             - Index and snapshot statistics
/// POST   /snapshot/rebuild  - Force a snapshot rebuild
/// GET    /health            - Liveness and index freshness
/// ```
pub fn create_router(state: Arc<AppState>) -> Router {
    let chunk_routes = Router::new()
        .route("/", post(handlers::ingest_chunk))
        .route("/batch", post(handlers::ingest_batch))
        .route("/{id}", get(handlers::get_chunk))
        .route("/{id}", delete(handlers::delete_chunk));

    Router::new()
        .nest("/chunks", chunk_routes)
        .route("/documents/{id}", delete(handlers::delete_document))
        .route("/query", post(handlers::query))
        .route("/stats", get(handlers::stats))
        .route("/snapshot/rebuild", post(handlers::rebuild_snapshot))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
