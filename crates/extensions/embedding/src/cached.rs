//! Bounded embedding cache.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use ragvault_protocols::{Embedding, EmbeddingError, EmbeddingProvider};

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Embedding>,
    order: VecDeque<String>,
}

/// Caches embeddings by exact text, evicting the oldest entry once
/// `capacity` is reached. Failures are never cached.
pub struct CachedEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    capacity: usize,
    state: Mutex<CacheState>,
}

impl CachedEmbeddingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, capacity: usize) -> Self {
        Self {
            inner,
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, text: &str) -> Option<Embedding> {
        self.state.lock().entries.get(text).cloned()
    }

    fn remember(&self, text: &str, embedding: &Embedding) {
        if self.capacity == 0 {
            return;
        }
        let mut state = self.state.lock();
        if state.entries.contains_key(text) {
            return;
        }
        while state.entries.len() >= self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
        }
        state.order.push_back(text.to_string());
        state.entries.insert(text.to_string(), embedding.clone());
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbeddingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if let Some(hit) = self.lookup(text) {
            trace!("embedding cache hit");
            return Ok(hit);
        }
        let embedding = self.inner.embed(text).await?;
        self.remember(text, &embedding);
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        let mut out: Vec<Option<Embedding>> = texts.iter().map(|t| self.lookup(t)).collect();
        let missing: Vec<&str> = texts
            .iter()
            .zip(&out)
            .filter(|(_, hit)| hit.is_none())
            .map(|(t, _)| *t)
            .collect();

        if !missing.is_empty() {
            let fetched = self.inner.embed_batch(&missing).await?;
            let mut fetched = missing.iter().zip(fetched);
            for (slot, text) in out.iter_mut().zip(texts) {
                if slot.is_none() {
                    if let Some((_, embedding)) = fetched.next() {
                        self.remember(text, &embedding);
                        *slot = Some(embedding);
                    }
                }
            }
        }

        out.into_iter()
            .map(|e| e.ok_or_else(|| EmbeddingError::Unavailable("short batch response".to_string())))
            .collect()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}
