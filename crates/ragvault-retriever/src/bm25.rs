//! BM25 keyword scoring over a [`CorpusSnapshot`].

use std::collections::{BTreeSet, HashMap};

use ragvault_protocols::ChunkId;

use crate::snapshot::CorpusSnapshot;
use crate::tokenizer::Tokenizer;

/// BM25 parameters.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Config {
    /// Term-frequency saturation.
    pub k1: f32,
    /// Length normalization strength.
    pub b: f32,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// `ln((N - df + 0.5) / (df + 0.5) + 1)`; always positive for `df <= N`.
pub fn idf(total_chunks: usize, document_frequency: usize) -> f64 {
    let n = total_chunks as f64;
    let df = document_frequency as f64;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Keyword index: tokenizer plus BM25 scorer. The corpus statistics live in
/// the snapshot handed to each search.
#[derive(Debug, Clone)]
pub struct KeywordIndex {
    config: Bm25Config,
    tokenizer: Tokenizer,
}

impl KeywordIndex {
    pub fn new(config: Bm25Config, tokenizer: Tokenizer) -> Self {
        Self { config, tokenizer }
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn config(&self) -> Bm25Config {
        self.config
    }

    /// Tokenize query text into de-duplicated terms.
    pub fn query_terms(&self, text: &str) -> Vec<String> {
        let unique: BTreeSet<String> = self.tokenizer.tokenize(text).into_iter().collect();
        unique.into_iter().collect()
    }

    /// Score `text` against `snapshot`. Returns the top `k` chunks with a
    /// positive score, descending, ties by ascending id. Entries newer than
    /// `max_version` are skipped.
    pub fn search(
        &self,
        snapshot: &CorpusSnapshot,
        text: &str,
        k: usize,
        max_version: u64,
    ) -> Vec<(ChunkId, f32)> {
        let terms = self.query_terms(text);
        self.search_terms(snapshot, &terms, k, max_version)
    }

    /// Score pre-tokenized, de-duplicated terms.
    pub fn search_terms(
        &self,
        snapshot: &CorpusSnapshot,
        terms: &[String],
        k: usize,
        max_version: u64,
    ) -> Vec<(ChunkId, f32)> {
        if k == 0 || terms.is_empty() || snapshot.is_empty() {
            return Vec::new();
        }

        let n = snapshot.len();
        let avgdl = snapshot.average_length();
        let k1 = f64::from(self.config.k1);
        let b = f64::from(self.config.b);

        let mut scores: HashMap<&ChunkId, f64> = HashMap::new();
        for term in terms {
            let Some(postings) = snapshot.postings(term) else {
                continue;
            };
            let term_idf = idf(n, postings.len());

            for id in postings {
                let Some(entry) = snapshot.entry(id) else {
                    continue;
                };
                if entry.version > max_version {
                    continue;
                }
                let tf = f64::from(entry.term_frequency(term));
                let length_norm = if avgdl > 0.0 {
                    1.0 - b + b * f64::from(entry.length) / avgdl
                } else {
                    1.0
                };
                let term_score = term_idf * tf * (k1 + 1.0) / (tf + k1 * length_norm);
                *scores.entry(id).or_insert(0.0) += term_score;
            }
        }

        let mut results: Vec<(ChunkId, f32)> = scores
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(id, score)| (id.clone(), score as f32))
            .collect();
        results.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        results.truncate(k);
        results
    }
}

impl Default for KeywordIndex {
    fn default() -> Self {
        Self::new(Bm25Config::default(), Tokenizer::new())
    }
}

#[cfg(test)]
#[path = "bm25_tests.rs"]
mod tests;
