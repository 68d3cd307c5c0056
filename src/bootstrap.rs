//! Process bootstrap: turn a [`Config`] into a running retriever.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use ragvault_api::{IngestRetryPolicy, QueryDefaults};
use ragvault_config::{
    Config, EmbeddingProviderKind, RebuildMode as ConfigRebuildMode, SnapshotPolicy, StoreBackend,
};
use ragvault_embedding::{
    CachedEmbeddingProvider, HashEmbedding, OpenAIEmbedding, OpenAIEmbeddingConfig,
};
use ragvault_protocols::{ChunkStore, EmbeddingProvider, QueryMode};
use ragvault_retriever::{
    Bm25Config, ConsistencyPolicy, FusionConfig, HybridRetriever, MemoryChunkStore, RebuildMode,
    RetrieverConfig, SnapshotConfig, Tokenizer,
};
use ragvault_store_sqlite::SqliteChunkStore;

pub(crate) type BoxError = Box<dyn Error + Send + Sync>;

/// Open the configured chunk store.
pub(crate) async fn build_store(config: &Config) -> Result<Arc<dyn ChunkStore>, BoxError> {
    let capacity = config.store.change_log_capacity;
    let store: Arc<dyn ChunkStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryChunkStore::with_capacity(capacity)),
        StoreBackend::Sqlite => Arc::new(
            SqliteChunkStore::open(&config.store.path)
                .await?
                .with_change_log_capacity(capacity),
        ),
    };
    info!(backend = store.id(), "chunk store opened");
    Ok(store)
}

/// Build the configured embedding provider, cached when `cache_size > 0`.
pub(crate) fn build_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>, BoxError> {
    let embedding = &config.embedding;
    let provider: Arc<dyn EmbeddingProvider> = match embedding.provider {
        EmbeddingProviderKind::Hash => Arc::new(HashEmbedding::new(embedding.dimension)),
        EmbeddingProviderKind::Openai => {
            let api_key = embedding
                .api_key
                .clone()
                .filter(|key| !key.is_empty())
                .ok_or("embedding.api_key is required for the openai provider")?;
            Arc::new(OpenAIEmbedding::new(
                OpenAIEmbeddingConfig::new(api_key)
                    .with_model(embedding.model.clone())
                    .with_base_url(embedding.base_url.clone())
                    .with_dimension(embedding.dimension)
                    .with_timeout(Duration::from_secs(embedding.timeout_secs)),
            ))
        }
    };

    if embedding.cache_size == 0 {
        return Ok(provider);
    }
    Ok(Arc::new(CachedEmbeddingProvider::new(
        provider,
        embedding.cache_size,
    )))
}

/// Map the file configuration onto the retriever's runtime configuration.
pub(crate) fn retriever_config(config: &Config) -> RetrieverConfig {
    let snapshot = &config.snapshot;
    RetrieverConfig {
        fetch_multiplier: config.retriever.fetch_multiplier,
        fusion: FusionConfig {
            k: config.retriever.rrf_k,
        },
        bm25: Bm25Config {
            k1: config.keyword.k1,
            b: config.keyword.b,
        },
        tokenizer: Tokenizer::from_lists(&config.keyword.stopwords, &config.keyword.allowlist),
        snapshot: SnapshotConfig {
            policy: match snapshot.policy {
                SnapshotPolicy::Strict => ConsistencyPolicy::Strict,
                SnapshotPolicy::Relaxed => ConsistencyPolicy::Relaxed,
            },
            rebuild_mode: match snapshot.rebuild {
                ConfigRebuildMode::Lazy => RebuildMode::Lazy,
                ConfigRebuildMode::Eager => RebuildMode::Eager,
            },
            incremental: snapshot.incremental,
            max_sync_rebuild: Duration::from_millis(snapshot.max_sync_rebuild_ms),
            warm_on_start: snapshot.warm_on_start,
        },
        vacuum_threshold: config.vector.vacuum_threshold,
    }
}

pub(crate) fn retry_policy(config: &Config) -> IngestRetryPolicy {
    IngestRetryPolicy::new(
        config.ingest.max_attempts,
        Duration::from_millis(config.ingest.initial_backoff_ms),
        Duration::from_millis(config.ingest.max_backoff_ms),
    )
}

pub(crate) fn query_defaults(config: &Config) -> Result<QueryDefaults, BoxError> {
    let mode: QueryMode = config.retriever.default_mode.parse()?;
    Ok(QueryDefaults {
        top_k: config.retriever.default_top_k,
        mode,
    })
}

/// Open the store and embedder and bring the retriever up.
pub(crate) async fn open_retriever(config: &Config) -> Result<Arc<HybridRetriever>, BoxError> {
    let store = build_store(config).await?;
    let embedder = build_embedder(config)?;
    let retriever = HybridRetriever::open(store, embedder, retriever_config(config)).await?;
    Ok(Arc::new(retriever))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragvault_config::ConfigLoader;
    use ragvault_protocols::Metadata;
    use tempfile::TempDir;

    fn memory_config() -> Config {
        ConfigLoader::load_str(
            r#"
[store]
backend = "memory"

[embedding]
provider = "hash"
dimension = 32
cache_size = 0

[snapshot]
policy = "relaxed"
rebuild = "eager"
max_sync_rebuild_ms = 50

[keyword]
k1 = 1.2
stopwords = ["the"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_retriever_config_mapping() {
        let config = retriever_config(&memory_config());
        assert_eq!(config.snapshot.policy, ConsistencyPolicy::Relaxed);
        assert_eq!(config.snapshot.rebuild_mode, RebuildMode::Eager);
        assert_eq!(config.snapshot.max_sync_rebuild, Duration::from_millis(50));
        assert_eq!(config.bm25.k1, 1.2);
        assert_eq!(config.fusion.k, 60.0);
        assert_eq!(config.tokenizer.tokenize("the docker"), vec!["docker"]);
    }

    #[test]
    fn test_retry_policy_and_defaults() {
        let config = Config::default();
        let policy = retry_policy(&config);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(200));

        let defaults = query_defaults(&config).unwrap();
        assert_eq!(defaults.top_k, 5);
        assert_eq!(defaults.mode, QueryMode::Hybrid);
    }

    #[test]
    fn test_invalid_default_mode() {
        let mut config = Config::default();
        config.retriever.default_mode = "semantic".to_string();
        assert!(query_defaults(&config).is_err());
    }

    #[test]
    fn test_openai_requires_api_key() {
        let mut config = Config::default();
        config.embedding.provider = EmbeddingProviderKind::Openai;
        config.embedding.api_key = None;
        assert!(build_embedder(&config).is_err());

        config.embedding.api_key = Some("sk-test".to_string());
        let embedder = build_embedder(&config).unwrap();
        assert_eq!(embedder.dimension(), config.embedding.dimension);
    }

    #[tokio::test]
    async fn test_open_memory_retriever() {
        let retriever = open_retriever(&memory_config()).await.unwrap();
        assert_eq!(retriever.dimension(), 32);
        retriever.ingest("hello world", Metadata::new()).await.unwrap();
        assert_eq!(retriever.stats().await.unwrap().chunk_count, 1);
    }

    #[tokio::test]
    async fn test_open_sqlite_retriever() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.store.path = dir.path().join("data").join("ragvault.db");

        let retriever = open_retriever(&config).await.unwrap();
        retriever.ingest("persisted", Metadata::new()).await.unwrap();
        drop(retriever);

        let reopened = open_retriever(&config).await.unwrap();
        assert_eq!(reopened.stats().await.unwrap().store_version, 1);
    }
}
