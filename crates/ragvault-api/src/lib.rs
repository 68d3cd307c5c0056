//! # ragvault API
//!
//! External surface of the ragvault retrieval engine.
//!
//! - **HTTP**: axum REST endpoints for ingestion, deletion, queries and
//!   snapshot administration
//! - **Ingestion**: the retry boundary for transient embedding and store
//!   failures; the retriever itself never retries

pub mod error;
pub mod http;
pub mod ingestion;
pub mod server;
pub mod state;

pub use error::{ApiError, ErrorResponse};
pub use http::routes::create_router;
pub use ingestion::IngestRetryPolicy;
pub use server::{ApiServer, ServerConfig};
pub use state::{AppState, QueryDefaults};
