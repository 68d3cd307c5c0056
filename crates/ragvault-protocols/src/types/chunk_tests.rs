use super::*;
use serde_json::json;

#[test]
fn test_chunk_id_is_deterministic() {
    let a = ChunkId::derive("doc", 0, "docker compose tutorial");
    let b = ChunkId::derive("doc", 0, "docker compose tutorial");
    assert_eq!(a, b);
    assert_eq!(a.as_str().len(), 64);
}

#[test]
fn test_chunk_id_uses_normalized_text() {
    let a = ChunkId::derive("doc", 0, "docker   compose\ttutorial ");
    let b = ChunkId::derive("doc", 0, "docker compose tutorial");
    assert_eq!(a, b);
}

#[test]
fn test_chunk_id_depends_on_document_and_ordinal() {
    let base = ChunkId::derive("doc", 0, "same text");
    assert_ne!(base, ChunkId::derive("doc", 1, "same text"));
    assert_ne!(base, ChunkId::derive("other", 0, "same text"));
}

#[test]
fn test_chunk_id_fields_do_not_run_together() {
    // "doc1" + 0 must not collide with "doc" + 10.
    assert_ne!(
        ChunkId::derive("doc1", 0, "text"),
        ChunkId::derive("doc", 10, "text")
    );
}

#[test]
fn test_chunk_id_short() {
    let id = ChunkId::derive("doc", 0, "text");
    assert_eq!(id.short().len(), 12);
    assert!(id.as_str().starts_with(id.short()));
    assert_eq!(ChunkId::from("abc").short(), "abc");
}

#[test]
fn test_normalize_text() {
    assert_eq!(normalize_text("  hello \n\n world  "), "hello world");
    assert_eq!(normalize_text(""), "");
    assert_eq!(normalize_text("Case Kept"), "Case Kept");
}

#[test]
fn test_content_hash_ignores_whitespace_layout() {
    assert_eq!(content_hash("a  b"), content_hash(" a b "));
    assert_ne!(content_hash("a b"), content_hash("a c"));
}

#[test]
fn test_chunk_input_from_metadata() {
    let mut metadata = Metadata::new();
    metadata.insert("document_id".to_string(), json!("guide"));
    metadata.insert("ordinal".to_string(), json!(4));
    let input = ChunkInput::from_metadata("text", metadata);
    assert_eq!(input.document_id, "guide");
    assert_eq!(input.ordinal, 4);
}

#[test]
fn test_chunk_input_defaults() {
    let input = ChunkInput::from_metadata("text", Metadata::new());
    assert_eq!(input.document_id, DEFAULT_DOCUMENT_ID);
    assert_eq!(input.ordinal, 0);
    assert_eq!(input.chunk_id(), ChunkId::derive(DEFAULT_DOCUMENT_ID, 0, "text"));
}

#[test]
fn test_chunk_from_input() {
    let input = ChunkInput::new("hello world").with_document("doc", 2);
    let expected_id = input.chunk_id();
    let chunk = Chunk::from_input(input, Some(Embedding::new(vec![1.0, 0.0])));
    assert_eq!(chunk.id, expected_id);
    assert_eq!(chunk.document_id, "doc");
    assert_eq!(chunk.ordinal, 2);
    assert_eq!(chunk.content_hash, content_hash("hello world"));
    assert_eq!(chunk.version, 0);
}

#[test]
fn test_chunk_id_serializes_as_string() {
    let id = ChunkId::from("abc123");
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc123\"");
    let back: ChunkId = serde_json::from_str("\"abc123\"").unwrap();
    assert_eq!(back, id);
}
