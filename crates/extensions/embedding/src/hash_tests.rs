use super::*;

#[test]
fn test_default_dimension() {
    let provider = HashEmbedding::default();
    assert_eq!(provider.dimension(), 384);
    assert_eq!(provider.name(), "hash");
}

#[test]
fn test_zero_dimension_is_clamped() {
    assert_eq!(HashEmbedding::new(0).dimension(), 1);
}

#[test]
fn test_identical_text_is_self_similar() {
    let provider = HashEmbedding::new(128);
    let a = provider.embed_text("docker compose tutorial");
    let b = provider.embed_text("Docker  compose, tutorial!");
    assert!((a.cosine_similarity(&b) - 1.0).abs() < 1e-5);
    assert!((a.magnitude() - 1.0).abs() < 1e-5);
}

#[test]
fn test_shared_words_are_closer() {
    let provider = HashEmbedding::new(384);
    let query = provider.embed_text("vector search");
    let related = provider.embed_text("postgresql vector search");
    let unrelated = provider.embed_text("git version control basics");
    assert!(query.cosine_similarity(&related) > query.cosine_similarity(&unrelated));
    assert!(query.cosine_similarity(&related) > 0.5);
}

#[test]
fn test_empty_text_is_zero_vector() {
    let provider = HashEmbedding::new(32);
    let emb = provider.embed_text("  ... ");
    assert_eq!(emb.dimension, 32);
    assert!(emb.is_zero());
}

#[tokio::test]
async fn test_batch_matches_single() {
    let provider = HashEmbedding::new(64);
    let batch = provider.embed_batch(&["alpha", "beta"]).await.unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[1], provider.embed("beta").await.unwrap());
}
