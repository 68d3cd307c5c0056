//! Ingestion retry boundary.
//!
//! Transient failures (embedding provider or store unavailable) are retried
//! here with exponential backoff. Index mutations are idempotent, so
//! replaying an ingest after a partial failure is safe.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use ragvault_protocols::{ChunkInput, IngestOutcome, RetrievalError};
use ragvault_retriever::HybridRetriever;

/// Retry policy for ingestion calls.
#[derive(Debug, Clone)]
pub struct IngestRetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
}

impl Default for IngestRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl IngestRetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Delay after the given failed attempt (0-based): doubles each time,
    /// capped at `max_backoff`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or runs out of attempts.
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<T, RetrievalError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RetrievalError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %err,
                        ?delay,
                        "ingest failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Ingest one chunk through the retriever under this policy.
    pub async fn ingest(
        &self,
        retriever: &HybridRetriever,
        input: ChunkInput,
    ) -> Result<IngestOutcome, RetrievalError> {
        debug!(document = %input.document_id, ordinal = input.ordinal, "ingest with retry");
        self.run(|| retriever.ingest_chunk(input.clone())).await
    }

    /// Ingest a batch under this policy. Chunks stored by a failed attempt
    /// are replayed as `created: false` by the next one.
    pub async fn ingest_batch(
        &self,
        retriever: &HybridRetriever,
        inputs: Vec<ChunkInput>,
    ) -> Result<Vec<IngestOutcome>, RetrievalError> {
        debug!(chunks = inputs.len(), "batch ingest with retry");
        self.run(|| retriever.ingest_batch(inputs.clone())).await
    }
}

#[cfg(test)]
#[path = "ingestion_tests.rs"]
mod tests;
