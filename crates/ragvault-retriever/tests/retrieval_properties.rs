//! End-to-end properties of the hybrid retriever over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use ragvault_embedding::HashEmbedding;
use ragvault_protocols::{
    Chunk, ChunkId, ChunkInput, ChunkStore, Embedding, EmbeddingProvider, Metadata, QueryMode,
    SnapshotState, StaleReason,
};
use ragvault_retriever::{
    ConsistencyPolicy, FusionConfig, FusionEngine, HybridRetriever, MemoryChunkStore,
    RetrieverConfig, SnapshotConfig,
};

const DIM: usize = 384;

const CORPUS: [&str; 3] = [
    "docker compose tutorial",
    "git version control basics",
    "postgresql vector search",
];

async fn open(config: RetrieverConfig) -> (HybridRetriever, Arc<MemoryChunkStore>) {
    let store = Arc::new(MemoryChunkStore::new());
    let retriever = HybridRetriever::open(store.clone(), Arc::new(HashEmbedding::new(DIM)), config)
        .await
        .unwrap();
    (retriever, store)
}

async fn strict() -> (HybridRetriever, Arc<MemoryChunkStore>) {
    open(RetrieverConfig::default()).await
}

fn at(document_id: &str, ordinal: u32) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("document_id".to_string(), json!(document_id));
    metadata.insert("ordinal".to_string(), json!(ordinal));
    metadata
}

async fn load_corpus(retriever: &HybridRetriever) -> Vec<ChunkId> {
    let mut ids = Vec::new();
    for (i, text) in CORPUS.iter().enumerate() {
        ids.push(retriever.ingest(text, at("corpus", i as u32)).await.unwrap());
    }
    ids
}

fn rank_of(response: &ragvault_protocols::QueryResponse, id: &ChunkId) -> Option<usize> {
    response
        .results
        .iter()
        .find(|r| &r.chunk_id == id)
        .map(|r| r.rank)
}

// ============================================================================
// Mutation counter
// ============================================================================

#[tokio::test]
async fn test_mutation_counter_counts_each_successful_write_once() {
    let (retriever, store) = strict().await;

    let mut expected = 0;
    let mut ids = Vec::new();
    for i in 0..10u32 {
        ids.push(retriever.ingest(&format!("chunk number {i}"), at("d", i)).await.unwrap());
        expected += 1;
    }
    // Duplicates and deletes of absent ids are not mutations.
    retriever.ingest("chunk number 3", at("d", 3)).await.unwrap();
    assert!(!retriever.delete(&ChunkId::from("absent")).await.unwrap());

    for id in ids.iter().step_by(3) {
        assert!(retriever.delete(id).await.unwrap());
        expected += 1;
    }
    assert!(!retriever.delete(&ids[0]).await.unwrap());

    assert_eq!(store.mutation_counter().await.unwrap(), expected);
    assert_eq!(retriever.stats().await.unwrap().store_version, expected);
}

// ============================================================================
// Vector self-similarity and deletion
// ============================================================================

#[tokio::test]
async fn test_verbatim_text_is_its_own_nearest_neighbour() {
    let (retriever, _) = strict().await;
    let ids = load_corpus(&retriever).await;

    for (text, id) in CORPUS.iter().zip(&ids) {
        let response = retriever.query(text, 3, QueryMode::Vector).await.unwrap();
        let top = &response.results[0];
        assert_eq!(&top.chunk_id, id);
        assert!((top.score - 1.0).abs() < 1e-5, "self-similarity {}", top.score);
    }
}

#[tokio::test]
async fn test_deleted_chunk_is_never_returned() {
    let (retriever, _) = strict().await;
    load_corpus(&retriever).await;
    let id = retriever
        .ingest("ephemeral kubernetes note", Metadata::new())
        .await
        .unwrap();

    assert!(retriever.delete(&id).await.unwrap());
    for mode in [QueryMode::Vector, QueryMode::Keyword, QueryMode::Hybrid] {
        let response = retriever
            .query("ephemeral kubernetes note", 10, mode)
            .await
            .unwrap();
        assert!(rank_of(&response, &id).is_none(), "{mode} returned a deleted chunk");
    }
}

// ============================================================================
// Idempotent ingestion
// ============================================================================

#[tokio::test]
async fn test_reingesting_identical_content_is_idempotent() {
    let (retriever, store) = strict().await;
    let first = retriever
        .ingest("Docker compose   tutorial", at("guide", 2))
        .await
        .unwrap();
    let second = retriever
        .ingest("  Docker compose tutorial\n", at("guide", 2))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(store.mutation_counter().await.unwrap(), 1);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_retry_after_partial_ingest_restores_both_indexes() {
    let (retriever, store) = strict().await;
    let input = ChunkInput::new("postgresql vector search").with_document("db", 0);

    // An earlier attempt committed to the store and stopped there.
    let embedding = HashEmbedding::new(DIM).embed(&input.text).await.unwrap();
    let id = store
        .insert(Chunk::from_input(input.clone(), Some(embedding)))
        .await
        .unwrap();

    let outcome = retriever.ingest_chunk(input).await.unwrap();
    assert!(!outcome.created);
    assert!(outcome.indexed_vector);
    assert_eq!(store.mutation_counter().await.unwrap(), 1);

    for mode in [QueryMode::Vector, QueryMode::Keyword] {
        let response = retriever
            .query("postgresql vector search", 1, mode)
            .await
            .unwrap();
        assert_eq!(response.results.len(), 1, "{mode}");
        assert_eq!(response.results[0].chunk_id, id, "{mode}");
    }
    assert_eq!(retriever.stats().await.unwrap().vector_entries, 1);
}

#[tokio::test]
async fn test_changed_text_gets_a_new_id() {
    let (retriever, store) = strict().await;
    let old = retriever.ingest("first draft", at("doc", 0)).await.unwrap();
    let new = retriever.ingest("second draft", at("doc", 0)).await.unwrap();
    assert_ne!(old, new);
    assert_eq!(store.count().await.unwrap(), 2);
}

// ============================================================================
// Fusion arithmetic
// ============================================================================

#[test]
fn test_symmetric_ranks_tie_and_resolve_by_ascending_id() {
    let a = ChunkId::from("A");
    let b = ChunkId::from("B");
    let engine = FusionEngine::new(FusionConfig { k: 60.0 });

    let fused = engine.fuse(
        &[(a.clone(), 0.9), (b.clone(), 0.8)],
        &[(b.clone(), 3.0), (a.clone(), 2.0)],
    );

    let expected = 1.0 / 61.0 + 1.0 / 62.0;
    assert_eq!(fused.len(), 2);
    assert!((fused[0].fused_score - expected).abs() < 1e-12);
    assert!((fused[1].fused_score - expected).abs() < 1e-12);
    assert_eq!(fused[0].chunk_id, a);
    assert_eq!(fused[1].chunk_id, b);
}

// ============================================================================
// Staleness
// ============================================================================

#[tokio::test]
async fn test_strict_policy_answers_new_terms_immediately() {
    let (retriever, _) = strict().await;
    load_corpus(&retriever).await;
    retriever.query("docker", 3, QueryMode::Keyword).await.unwrap();

    let id = retriever
        .ingest("zanzibar archipelago", Metadata::new())
        .await
        .unwrap();
    let response = retriever.query("zanzibar", 3, QueryMode::Keyword).await.unwrap();

    assert!(!response.is_stale());
    assert_eq!(rank_of(&response, &id), Some(1));
    assert_eq!(response.snapshot_version, Some(4));
    assert_eq!(
        retriever.stats().await.unwrap().index_freshness,
        SnapshotState::Fresh
    );
}

#[tokio::test]
async fn test_relaxed_policy_flags_stale_results_then_catches_up() {
    let config = RetrieverConfig {
        snapshot: SnapshotConfig {
            policy: ConsistencyPolicy::Relaxed,
            ..Default::default()
        },
        ..Default::default()
    };
    let (retriever, _) = open(config).await;
    load_corpus(&retriever).await;
    // Bring the snapshot up to date with the corpus.
    retriever.rebuild().await.unwrap();

    let id = retriever
        .ingest("zanzibar archipelago", Metadata::new())
        .await
        .unwrap();
    let stale = retriever.query("zanzibar", 3, QueryMode::Keyword).await.unwrap();
    assert!(stale.is_stale());
    let warning = &stale.warnings[0];
    assert_eq!(warning.reason, StaleReason::RelaxedPolicy);
    assert_eq!(warning.snapshot_version, 3);
    assert_eq!(warning.store_version, 4);
    assert!(rank_of(&stale, &id).is_none());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let response = retriever.query("zanzibar", 3, QueryMode::Keyword).await.unwrap();
        if !response.is_stale() {
            assert_eq!(rank_of(&response, &id), Some(1));
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "snapshot never caught up");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// Reference scenario
// ============================================================================

#[tokio::test]
async fn test_reference_scenario() {
    let (retriever, _) = strict().await;
    let ids = load_corpus(&retriever).await;

    let keyword = retriever.query("docker", 5, QueryMode::Keyword).await.unwrap();
    assert_eq!(keyword.results[0].chunk_id, ids[0]);
    assert!(keyword.results[0].score > 0.0);
    assert_eq!(keyword.results.len(), 1);

    let mut near_chunk_3 = HashEmbedding::new(DIM).embed("postgresql vector search").await.unwrap();
    for v in near_chunk_3.vector.iter_mut().step_by(7) {
        *v += 0.01;
    }
    let vector = retriever
        .query_with_embedding("", Embedding::new(near_chunk_3.vector), 5, QueryMode::Vector)
        .await
        .unwrap();
    assert_eq!(vector.results[0].chunk_id, ids[2]);

    let hybrid = retriever
        .query("vector search in postgres", 5, QueryMode::Hybrid)
        .await
        .unwrap();
    let rank_3 = rank_of(&hybrid, &ids[2]).unwrap();
    for other in &ids[..2] {
        if let Some(rank) = rank_of(&hybrid, other) {
            assert!(rank_3 < rank);
        }
    }
    assert_eq!(rank_3, 1);
}

// ============================================================================
// Boundaries
// ============================================================================

#[tokio::test]
async fn test_top_k_larger_than_corpus_returns_whole_corpus() {
    let (retriever, _) = strict().await;
    load_corpus(&retriever).await;

    for mode in [QueryMode::Vector, QueryMode::Hybrid] {
        let response = retriever.query("tutorial basics search", 50, mode).await.unwrap();
        assert_eq!(response.results.len(), CORPUS.len(), "{mode}");
        let ranks: Vec<usize> = response.results.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }
}

#[tokio::test]
async fn test_empty_corpus_returns_empty_list() {
    let (retriever, _) = strict().await;
    for mode in [QueryMode::Vector, QueryMode::Keyword, QueryMode::Hybrid] {
        let response = retriever.query("anything at all", 5, mode).await.unwrap();
        assert!(response.results.is_empty());
        assert!(!response.is_stale());
    }
}

#[tokio::test]
async fn test_queries_are_deterministic() {
    let (retriever, _) = strict().await;
    load_corpus(&retriever).await;
    let first = retriever.query("version search", 3, QueryMode::Hybrid).await.unwrap();
    let second = retriever.query("version search", 3, QueryMode::Hybrid).await.unwrap();
    assert_eq!(first.results, second.results);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_and_readers() {
    let (retriever, store) = strict().await;
    let retriever = Arc::new(retriever);

    let mut writers = Vec::new();
    for w in 0..4u32 {
        let retriever = retriever.clone();
        writers.push(tokio::spawn(async move {
            let mut writes = 0u64;
            for i in 0..10u32 {
                let id = retriever
                    .ingest_chunk(
                        ChunkInput::new(format!("writer {w} note {i}")).with_document(format!("w{w}"), i),
                    )
                    .await
                    .unwrap()
                    .chunk_id;
                writes += 1;
                if i % 2 == 0 && retriever.delete(&id).await.unwrap() {
                    writes += 1;
                }
            }
            writes
        }));
    }

    let mut readers = Vec::new();
    for _ in 0..4 {
        let retriever = retriever.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..10 {
                let response = retriever.query("writer note", 5, QueryMode::Hybrid).await.unwrap();
                assert!(response.results.len() <= 5);
            }
        }));
    }

    let mut total = 0;
    for writer in writers {
        total += writer.await.unwrap();
    }
    for reader in readers {
        reader.await.unwrap();
    }

    assert_eq!(store.mutation_counter().await.unwrap(), total);
    assert_eq!(store.count().await.unwrap(), 20);

    // Nothing deleted is ever returned once writes have settled.
    let response = retriever.query("writer note", 40, QueryMode::Hybrid).await.unwrap();
    assert_eq!(response.results.len(), 20);
    for result in &response.results {
        assert!(retriever.get(&result.chunk_id).await.is_ok());
    }
}

// ============================================================================
// Several writers over one store
// ============================================================================

#[tokio::test]
async fn test_second_writer_reaches_both_indexes() {
    let store = Arc::new(MemoryChunkStore::new());
    let server = HybridRetriever::open(
        store.clone(),
        Arc::new(HashEmbedding::new(DIM)),
        RetrieverConfig::default(),
    )
    .await
    .unwrap();
    load_corpus(&server).await;

    let cli = HybridRetriever::open(
        store.clone(),
        Arc::new(HashEmbedding::new(DIM)),
        RetrieverConfig::default(),
    )
    .await
    .unwrap();
    let added = cli
        .ingest("pgvector index tuning", at("extra", 0))
        .await
        .unwrap();
    let removed = ChunkId::derive("corpus", 0, CORPUS[0]);
    assert!(cli.delete(&removed).await.unwrap());

    let keyword = server
        .query("pgvector tuning", 5, QueryMode::Keyword)
        .await
        .unwrap();
    assert_eq!(keyword.results[0].chunk_id, added);

    let vector = server
        .query("pgvector index tuning", 5, QueryMode::Vector)
        .await
        .unwrap();
    assert_eq!(vector.results[0].chunk_id, added);
    assert!(vector.results.iter().all(|r| r.chunk_id != removed));

    let stats = server.stats().await.unwrap();
    assert_eq!(stats.index_freshness, SnapshotState::Fresh);
    assert_eq!(stats.chunk_count, 3);
    assert_eq!(stats.vector_entries, 3);
}

#[tokio::test]
async fn test_vector_only_reader_catches_up_without_keyword_queries() {
    let store = Arc::new(MemoryChunkStore::new());
    let server = HybridRetriever::open(
        store.clone(),
        Arc::new(HashEmbedding::new(DIM)),
        RetrieverConfig::default(),
    )
    .await
    .unwrap();
    let cli = HybridRetriever::open(
        store.clone(),
        Arc::new(HashEmbedding::new(DIM)),
        RetrieverConfig::default(),
    )
    .await
    .unwrap();

    let id = cli
        .ingest("git version control basics", Metadata::new())
        .await
        .unwrap();
    let response = server
        .query("git version control basics", 3, QueryMode::Vector)
        .await
        .unwrap();
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].chunk_id, id);
    assert!((response.results[0].score - 1.0).abs() < 1e-5);
}
