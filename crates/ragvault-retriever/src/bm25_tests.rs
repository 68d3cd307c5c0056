use super::*;
use ragvault_protocols::{Chunk, ChunkInput};
use tokio_util::sync::CancellationToken;

use crate::tokenizer::DenyList;

fn corpus(texts: &[&str]) -> (Vec<Chunk>, CorpusSnapshot) {
    let chunks: Vec<Chunk> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let mut chunk =
                Chunk::from_input(ChunkInput::new(*text).with_document("doc", i as u32), None);
            chunk.version = i as u64 + 1;
            chunk
        })
        .collect();
    let snapshot = CorpusSnapshot::build(
        chunks.len() as u64,
        &chunks,
        &Tokenizer::new(),
        &CancellationToken::new(),
    )
    .unwrap();
    (chunks, snapshot)
}

#[test]
fn test_idf_formula() {
    // N = 3, df = 1: ln((3 - 1 + 0.5) / 1.5 + 1)
    let expected = (2.5f64 / 1.5 + 1.0).ln();
    assert!((idf(3, 1) - expected).abs() < 1e-12);
    assert!(idf(3, 3) > 0.0);
    assert!(idf(3, 1) > idf(3, 2));
}

#[test]
fn test_scenario_docker() {
    let (chunks, snapshot) = corpus(&[
        "docker compose tutorial",
        "git version control basics",
        "postgresql vector search",
    ]);
    let index = KeywordIndex::default();
    let results = index.search(&snapshot, "docker", 10, u64::MAX);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, chunks[0].id);
    assert!(results[0].1 > 0.0);
}

#[test]
fn test_exact_score_single_term() {
    let (_, snapshot) = corpus(&["a b", "b c d e"]);
    let index = KeywordIndex::default();
    let results = index.search(&snapshot, "a", 10, u64::MAX);

    let (k1, b) = (1.5f64, 0.75f64);
    let avgdl = 3.0;
    let tf = 1.0;
    let expected = idf(2, 1) * tf * (k1 + 1.0) / (tf + k1 * (1.0 - b + b * 2.0 / avgdl));
    assert!((f64::from(results[0].1) - expected).abs() < 1e-5);
}

#[test]
fn test_query_terms_deduplicated() {
    let (_, snapshot) = corpus(&["rust tokio", "python asyncio"]);
    let index = KeywordIndex::default();
    let once = index.search(&snapshot, "rust", 10, u64::MAX);
    let twice = index.search(&snapshot, "rust Rust RUST", 10, u64::MAX);
    assert_eq!(once, twice);
    assert_eq!(index.query_terms("b a b"), vec!["a", "b"]);
}

#[test]
fn test_shorter_chunk_ranks_higher() {
    let (chunks, snapshot) = corpus(&["rust", "rust with many other words here"]);
    let results = KeywordIndex::default().search(&snapshot, "rust", 10, u64::MAX);
    assert_eq!(results[0].0, chunks[0].id);
    assert!(results[0].1 > results[1].1);
}

#[test]
fn test_ties_break_by_ascending_id() {
    let (chunks, snapshot) = corpus(&["same words", "same words", "same words"]);
    let results = KeywordIndex::default().search(&snapshot, "same", 10, u64::MAX);
    let mut expected: Vec<ChunkId> = chunks.iter().map(|c| c.id.clone()).collect();
    expected.sort();
    let got: Vec<ChunkId> = results.into_iter().map(|(id, _)| id).collect();
    assert_eq!(got, expected);
}

#[test]
fn test_only_matching_chunks_returned() {
    let (_, snapshot) = corpus(&["alpha", "beta", "gamma"]);
    let index = KeywordIndex::default();
    assert!(index.search(&snapshot, "delta", 10, u64::MAX).is_empty());
    assert!(index.search(&snapshot, "", 10, u64::MAX).is_empty());
    assert!(index.search(&snapshot, "alpha", 0, u64::MAX).is_empty());
}

#[test]
fn test_max_version_filter() {
    let (chunks, snapshot) = corpus(&["shared term", "shared term again"]);
    let index = KeywordIndex::default();
    let results = index.search(&snapshot, "shared", 10, 1);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, chunks[0].id);
}

#[test]
fn test_stopwords_in_query_ignored() {
    let tokenizer = Tokenizer::with_filter(DenyList::new(["the"]));
    let chunks = vec![Chunk::from_input(ChunkInput::new("the cat"), None)];
    let snapshot =
        CorpusSnapshot::build(1, &chunks, &tokenizer, &CancellationToken::new()).unwrap();
    let index = KeywordIndex::new(Bm25Config::default(), tokenizer);
    assert!(index.search(&snapshot, "the", 10, u64::MAX).is_empty());
    assert_eq!(index.search(&snapshot, "the cat", 10, u64::MAX).len(), 1);
}
