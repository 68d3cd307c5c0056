//! Application state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ragvault_protocols::QueryMode;
use ragvault_retriever::HybridRetriever;

use crate::ingestion::IngestRetryPolicy;

/// Defaults applied to query requests that omit fields.
#[derive(Debug, Clone, Copy)]
pub struct QueryDefaults {
    pub top_k: usize,
    pub mode: QueryMode,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            top_k: 5,
            mode: QueryMode::Hybrid,
        }
    }
}

/// Application state shared across handlers.
pub struct AppState {
    pub retriever: Arc<HybridRetriever>,
    pub retry: IngestRetryPolicy,
    pub defaults: QueryDefaults,
    start_time: Instant,
}

impl AppState {
    pub fn new(retriever: Arc<HybridRetriever>) -> Self {
        Self {
            retriever,
            retry: IngestRetryPolicy::default(),
            defaults: QueryDefaults::default(),
            start_time: Instant::now(),
        }
    }

    pub fn with_retry(mut self, retry: IngestRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_defaults(mut self, defaults: QueryDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Get uptime.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}
