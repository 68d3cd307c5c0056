use super::*;
use ragvault_protocols::{ChunkInput, Metadata};
use serde_json::json;

fn chunk(document: &str, ordinal: u32, text: &str) -> Chunk {
    Chunk::from_input(ChunkInput::new(text).with_document(document, ordinal), None)
}

#[tokio::test]
async fn test_insert_bumps_counter_and_assigns_version() {
    let store = MemoryChunkStore::new();
    assert_eq!(store.mutation_counter().await.unwrap(), 0);

    let id = store.insert(chunk("doc", 0, "alpha")).await.unwrap();
    assert_eq!(store.mutation_counter().await.unwrap(), 1);
    assert_eq!(store.get(&id).await.unwrap().version, 1);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_content_reports_existing_id() {
    let store = MemoryChunkStore::new();
    let id = store.insert(chunk("doc", 0, "alpha beta")).await.unwrap();

    let err = store
        .insert(chunk("doc", 0, "alpha   beta"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateContent { ref existing } if *existing == id));
    assert_eq!(store.mutation_counter().await.unwrap(), 1);
}

#[tokio::test]
async fn test_same_text_in_other_document_is_distinct() {
    let store = MemoryChunkStore::new();
    let a = store.insert(chunk("a", 0, "shared")).await.unwrap();
    let b = store.insert(chunk("b", 0, "shared")).await.unwrap();
    assert_ne!(a, b);
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_delete_absent_is_not_a_mutation() {
    let store = MemoryChunkStore::new();
    assert!(!store.delete(&ChunkId::from("missing")).await.unwrap());
    assert_eq!(store.mutation_counter().await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_then_reinsert() {
    let store = MemoryChunkStore::new();
    let id = store.insert(chunk("doc", 0, "alpha")).await.unwrap();
    assert!(store.delete(&id).await.unwrap());
    assert_eq!(store.mutation_counter().await.unwrap(), 2);
    assert!(matches!(store.get(&id).await, Err(StoreError::NotFound(_))));

    let again = store.insert(chunk("doc", 0, "alpha")).await.unwrap();
    assert_eq!(again, id);
    assert_eq!(store.get(&id).await.unwrap().version, 3);
}

#[tokio::test]
async fn test_get_many_skips_missing() {
    let store = MemoryChunkStore::new();
    let id = store.insert(chunk("doc", 0, "alpha")).await.unwrap();
    let found = store
        .get_many(&[id.clone(), ChunkId::from("missing")])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(found.contains_key(&id));
}

#[tokio::test]
async fn test_scan_is_sorted_and_versioned() {
    let store = MemoryChunkStore::new();
    for (i, text) in ["one", "two", "three"].iter().enumerate() {
        store.insert(chunk("doc", i as u32, text)).await.unwrap();
    }
    let scan = store.scan().await.unwrap();
    assert_eq!(scan.version, 3);
    assert_eq!(scan.chunks.len(), 3);
    assert!(scan.chunks.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test]
async fn test_changes_since_reports_net_changes() {
    let store = MemoryChunkStore::new();
    let a = store.insert(chunk("doc", 0, "a")).await.unwrap();
    let b = store.insert(chunk("doc", 1, "b")).await.unwrap();
    let c = store.insert(chunk("doc", 2, "c")).await.unwrap();
    store.delete(&a).await.unwrap();
    store.delete(&c).await.unwrap();

    let changes = store.changes_since(1).await.unwrap().unwrap();
    assert_eq!(changes.from_version, 1);
    assert_eq!(changes.to_version, 5);
    let inserted: Vec<_> = changes.inserted.iter().map(|c| c.id.clone()).collect();
    assert_eq!(inserted, vec![b]);
    assert!(changes.deleted.contains(&a));
    assert!(changes.deleted.contains(&c));
}

#[tokio::test]
async fn test_changes_since_current_is_empty() {
    let store = MemoryChunkStore::new();
    store.insert(chunk("doc", 0, "a")).await.unwrap();
    let changes = store.changes_since(1).await.unwrap().unwrap();
    assert!(changes.is_empty());
    assert_eq!(changes.to_version, 1);
}

#[tokio::test]
async fn test_changes_since_beyond_log_capacity() {
    let store = MemoryChunkStore::with_capacity(2);
    for i in 0..4 {
        store.insert(chunk("doc", i, "text")).await.unwrap();
    }
    assert!(store.changes_since(0).await.unwrap().is_none());
    assert!(store.changes_since(1).await.unwrap().is_none());
    let changes = store.changes_since(2).await.unwrap().unwrap();
    assert_eq!(changes.inserted.len(), 2);
}

#[tokio::test]
async fn test_documents_track_ordered_chunks() {
    let store = MemoryChunkStore::new();
    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), json!("guide.md"));
    let second = Chunk::from_input(
        ChunkInput::new("second")
            .with_document("guide", 1)
            .with_metadata(metadata.clone()),
        None,
    );
    let first = Chunk::from_input(
        ChunkInput::new("first")
            .with_document("guide", 0)
            .with_metadata(metadata),
        None,
    );
    let second_id = store.insert(second).await.unwrap();
    let first_id = store.insert(first).await.unwrap();

    let doc = store.get_document("guide").await.unwrap().unwrap();
    assert_eq!(doc.source.as_deref(), Some("guide.md"));
    assert_eq!(doc.chunk_ids, vec![first_id.clone(), second_id.clone()]);

    store.delete(&first_id).await.unwrap();
    store.delete(&second_id).await.unwrap();
    assert!(store.get_document("guide").await.unwrap().is_none());
}

#[tokio::test]
async fn test_snapshot_marker_is_not_a_mutation() {
    let store = MemoryChunkStore::new();
    assert!(store.snapshot_marker().await.unwrap().is_none());

    let marker = SnapshotMarker {
        version: 7,
        built_at: chrono::Utc::now(),
        chunk_count: 3,
    };
    store.record_snapshot_marker(marker.clone()).await.unwrap();
    assert_eq!(store.snapshot_marker().await.unwrap(), Some(marker));
    assert_eq!(store.mutation_counter().await.unwrap(), 0);
}
