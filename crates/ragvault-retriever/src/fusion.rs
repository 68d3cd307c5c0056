//! Reciprocal rank fusion.
//!
//! `fused(d) = Σ 1 / (k + rank_i(d))` over every source list containing `d`,
//! with 1-based ranks. Raw scores never enter the fused value; they are
//! carried along for display only.

use std::collections::HashMap;

use ragvault_protocols::ChunkId;

/// Default RRF smoothing constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

#[derive(Debug, Clone, Copy)]
pub struct FusionConfig {
    pub k: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self { k: DEFAULT_RRF_K }
    }
}

/// A candidate's position in one source list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceRank {
    /// 1-based.
    pub rank: usize,
    pub raw_score: f32,
}

/// One fused candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub chunk_id: ChunkId,
    pub fused_score: f64,
    pub vector: Option<SourceRank>,
    pub keyword: Option<SourceRank>,
}

impl FusedHit {
    pub fn in_both(&self) -> bool {
        self.vector.is_some() && self.keyword.is_some()
    }
}

/// Merges ranked vector and keyword candidate lists.
#[derive(Debug, Clone, Default)]
pub struct FusionEngine {
    config: FusionConfig,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    fn contribution(&self, rank: usize) -> f64 {
        1.0 / (self.config.k + rank as f64)
    }

    /// Fuse two ranked lists (best first).
    ///
    /// Output is ordered by fused score descending, then candidates present
    /// in both lists first, then chunk id ascending. A repeated id within
    /// one list keeps only its first (best) position.
    pub fn fuse(&self, vector: &[(ChunkId, f32)], keyword: &[(ChunkId, f32)]) -> Vec<FusedHit> {
        let mut hits: Vec<FusedHit> = Vec::with_capacity(vector.len() + keyword.len());
        let mut index: HashMap<ChunkId, usize> = HashMap::new();

        for (i, (id, score)) in vector.iter().enumerate() {
            let rank = SourceRank {
                rank: i + 1,
                raw_score: *score,
            };
            if index.contains_key(id) {
                continue;
            }
            index.insert(id.clone(), hits.len());
            hits.push(FusedHit {
                chunk_id: id.clone(),
                fused_score: self.contribution(rank.rank),
                vector: Some(rank),
                keyword: None,
            });
        }

        for (i, (id, score)) in keyword.iter().enumerate() {
            let rank = SourceRank {
                rank: i + 1,
                raw_score: *score,
            };
            match index.get(id) {
                Some(&pos) => {
                    let hit = &mut hits[pos];
                    if hit.keyword.is_none() {
                        hit.fused_score += self.contribution(rank.rank);
                        hit.keyword = Some(rank);
                    }
                }
                None => {
                    index.insert(id.clone(), hits.len());
                    hits.push(FusedHit {
                        chunk_id: id.clone(),
                        fused_score: self.contribution(rank.rank),
                        vector: None,
                        keyword: Some(rank),
                    });
                }
            }
        }

        hits.sort_by(|a, b| {
            b.fused_score
                .total_cmp(&a.fused_score)
                .then_with(|| b.in_both().cmp(&a.in_both()))
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits
    }
}

#[cfg(test)]
#[path = "fusion_tests.rs"]
mod tests;
