use super::*;

#[test]
fn test_query_mode_default() {
    assert_eq!(QueryMode::default(), QueryMode::Hybrid);
}

#[test]
fn test_query_mode_sources() {
    assert!(QueryMode::Hybrid.uses_vector());
    assert!(QueryMode::Hybrid.uses_keyword());
    assert!(QueryMode::Vector.uses_vector());
    assert!(!QueryMode::Vector.uses_keyword());
    assert!(!QueryMode::Keyword.uses_vector());
    assert!(QueryMode::Keyword.uses_keyword());
}

#[test]
fn test_query_mode_parse() {
    assert_eq!("hybrid".parse::<QueryMode>().unwrap(), QueryMode::Hybrid);
    assert_eq!(" Vector ".parse::<QueryMode>().unwrap(), QueryMode::Vector);
    assert_eq!("KEYWORD".parse::<QueryMode>().unwrap(), QueryMode::Keyword);
    assert!("semantic".parse::<QueryMode>().is_err());
}

#[test]
fn test_query_mode_serde() {
    assert_eq!(serde_json::to_string(&QueryMode::Keyword).unwrap(), "\"keyword\"");
    let mode: QueryMode = serde_json::from_str("\"vector\"").unwrap();
    assert_eq!(mode, QueryMode::Vector);
}

#[test]
fn test_query_result_raw_score() {
    let result = QueryResult {
        chunk_id: ChunkId::from("a"),
        text: "text".to_string(),
        metadata: Metadata::new(),
        score: 0.03,
        rank: 1,
        fused_score: Some(0.03),
        sources: vec![SourceHit {
            source: Source::Keyword,
            rank: 2,
            raw_score: 1.25,
        }],
    };
    assert_eq!(result.raw_score(Source::Keyword), Some(1.25));
    assert_eq!(result.raw_score(Source::Vector), None);
}

#[test]
fn test_empty_response() {
    let response = QueryResponse::empty(QueryMode::Hybrid, 4);
    assert!(response.results.is_empty());
    assert!(!response.is_stale());
    assert_eq!(response.as_of_version, 4);
    let json = serde_json::to_value(&response).unwrap();
    assert!(json.get("warnings").is_none());
    assert!(json.get("snapshot_version").is_none());
}

#[test]
fn test_snapshot_state_display() {
    assert_eq!(SnapshotState::Fresh.to_string(), "fresh");
    assert_eq!(SnapshotState::Building.to_string(), "building");
    assert_eq!(
        serde_json::to_string(&SnapshotState::Stale).unwrap(),
        "\"stale\""
    );
}
