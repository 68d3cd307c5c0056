//! Query path: capture, resolve, fan out, fuse, filter, truncate.

use tokio::task::JoinHandle;
use tracing::debug;

use ragvault_protocols::{
    ChunkId, Embedding, QueryMode, QueryResponse, QueryResult, RetrievalError, Source, SourceHit,
};

use super::HybridRetriever;
use crate::fusion::SourceRank;

type Hits = Vec<(ChunkId, f32)>;

/// A ranked candidate before it is joined with its stored chunk.
struct Candidate {
    chunk_id: ChunkId,
    score: f64,
    fused_score: Option<f64>,
    sources: Vec<SourceHit>,
}

impl Candidate {
    fn single(source: Source, position: usize, (chunk_id, raw_score): (ChunkId, f32)) -> Self {
        Self {
            chunk_id,
            score: f64::from(raw_score),
            fused_score: None,
            sources: vec![SourceHit {
                source,
                rank: position + 1,
                raw_score,
            }],
        }
    }
}

fn hit(source: Source, rank: Option<SourceRank>) -> Option<SourceHit> {
    rank.map(|r| SourceHit {
        source,
        rank: r.rank,
        raw_score: r.raw_score,
    })
}

async fn join_search<T>(task: Option<JoinHandle<T>>) -> Result<Option<T>, RetrievalError> {
    match task {
        Some(task) => task
            .await
            .map(Some)
            .map_err(|e| RetrievalError::IndexUnavailable(format!("search task failed: {e}"))),
        None => Ok(None),
    }
}

impl HybridRetriever {
    /// Answer a query. An empty corpus or blank text yields an empty list.
    pub async fn query(
        &self,
        text: &str,
        top_k: usize,
        mode: QueryMode,
    ) -> Result<QueryResponse, RetrievalError> {
        check_top_k(top_k)?;
        if text.trim().is_empty() {
            let version = self.store.mutation_counter().await?;
            return Ok(QueryResponse::empty(mode, version));
        }

        let embedding = if mode.uses_vector() {
            Some(self.embedder.embed(text).await?)
        } else {
            None
        };
        self.execute(text, embedding, top_k, mode).await
    }

    /// Answer a query with a caller-supplied query embedding. The embedding
    /// is ignored in keyword mode.
    pub async fn query_with_embedding(
        &self,
        text: &str,
        embedding: Embedding,
        top_k: usize,
        mode: QueryMode,
    ) -> Result<QueryResponse, RetrievalError> {
        check_top_k(top_k)?;
        let embedding = mode.uses_vector().then_some(embedding);
        self.execute(text, embedding, top_k, mode).await
    }

    async fn execute(
        &self,
        text: &str,
        embedding: Option<Embedding>,
        top_k: usize,
        mode: QueryMode,
    ) -> Result<QueryResponse, RetrievalError> {
        if let Some(embedding) = &embedding {
            if embedding.vector.len() != self.dimension() {
                return Err(RetrievalError::DimensionMismatch {
                    expected: self.dimension(),
                    actual: embedding.vector.len(),
                });
            }
        }

        let read_version = self.store.mutation_counter().await?;
        // A vector-only query still resolves the snapshot when another writer
        // has touched the store, since that rebuild is what catches the
        // vector index up.
        let resolved = if mode.uses_keyword() || read_version > self.vectors_current_through() {
            Some(self.snapshots.resolve(read_version).await?)
        } else {
            self.snapshots.observe(read_version);
            None
        };

        // A fresh snapshot may be newer than the captured counter; read the
        // vector index at the same version so both lists agree.
        let as_of = match &resolved {
            Some(r) if !r.is_stale() => r.snapshot.version().max(read_version),
            _ => read_version,
        };
        let fetch_k = top_k.saturating_mul(self.fetch_multiplier).max(top_k);

        let vector_task = embedding.map(|embedding| {
            let vectors = self.vectors.clone();
            tokio::task::spawn_blocking(move || vectors.search(&embedding, fetch_k, as_of))
        });
        let keyword_task = resolved.as_ref().filter(|_| mode.uses_keyword()).map(|resolved| {
            let keyword = self.keyword.clone();
            let snapshot = resolved.snapshot.clone();
            let text = text.to_string();
            tokio::task::spawn_blocking(move || keyword.search(&snapshot, &text, fetch_k, as_of))
        });

        let (vector_hits, keyword_hits) =
            tokio::join!(join_search(vector_task), join_search(keyword_task));
        let vector_hits: Hits = vector_hits?.transpose()?.unwrap_or_default();
        let keyword_hits: Hits = keyword_hits?.unwrap_or_default();

        let candidates: Vec<Candidate> = match mode {
            QueryMode::Hybrid => self
                .fusion
                .fuse(&vector_hits, &keyword_hits)
                .into_iter()
                .map(|fused| Candidate {
                    chunk_id: fused.chunk_id,
                    score: fused.fused_score,
                    fused_score: Some(fused.fused_score),
                    sources: hit(Source::Vector, fused.vector)
                        .into_iter()
                        .chain(hit(Source::Keyword, fused.keyword))
                        .collect(),
                })
                .collect(),
            QueryMode::Vector => vector_hits
                .into_iter()
                .enumerate()
                .map(|(i, h)| Candidate::single(Source::Vector, i, h))
                .collect(),
            QueryMode::Keyword => keyword_hits
                .into_iter()
                .enumerate()
                .map(|(i, h)| Candidate::single(Source::Keyword, i, h))
                .collect(),
        };

        // Tombstone filter before truncation so deletions never under-fill.
        let ids: Vec<ChunkId> = candidates.iter().map(|c| c.chunk_id.clone()).collect();
        let mut chunks = self.store.get_many(&ids).await?;
        let candidate_count = candidates.len();
        let results: Vec<QueryResult> = candidates
            .into_iter()
            .filter_map(|candidate| {
                let chunk = chunks.remove(&candidate.chunk_id)?;
                Some((candidate, chunk))
            })
            .take(top_k)
            .enumerate()
            .map(|(i, (candidate, chunk))| QueryResult {
                chunk_id: candidate.chunk_id,
                text: chunk.text,
                metadata: chunk.metadata,
                score: candidate.score,
                rank: i + 1,
                fused_score: candidate.fused_score,
                sources: candidate.sources,
            })
            .collect();

        debug!(
            %mode,
            top_k,
            fetch_k,
            candidates = candidate_count,
            returned = results.len(),
            as_of,
            "query answered"
        );

        let (warnings, snapshot_version) = match resolved {
            Some(resolved) => (
                resolved.warning.into_iter().collect(),
                mode.uses_keyword().then(|| resolved.snapshot.version()),
            ),
            None => (Vec::new(), None),
        };

        Ok(QueryResponse {
            mode,
            results,
            warnings,
            as_of_version: as_of,
            snapshot_version,
        })
    }
}

fn check_top_k(top_k: usize) -> Result<(), RetrievalError> {
    if top_k == 0 {
        return Err(RetrievalError::InvalidQuery(
            "top_k must be at least 1".to_string(),
        ));
    }
    Ok(())
}
