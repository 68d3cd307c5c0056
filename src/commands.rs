//! Subcommand handlers.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use ragvault_api::{ApiServer, AppState, ServerConfig};
use ragvault_config::Config;
use ragvault_protocols::{ChunkId, ChunkInput, QueryMode, QueryResponse, RetrieverStats, Source};

use crate::bootstrap::{self, BoxError};
use crate::cli::Commands;

/// Dispatch one subcommand.
pub(crate) async fn run(command: Commands, config: Config) -> Result<(), BoxError> {
    if let Commands::Serve { host, port } = command {
        return serve(&config, host, port).await;
    }

    let retriever = bootstrap::open_retriever(&config).await?;
    let result = match command {
        Commands::Ingest {
            text,
            file,
            document_id,
            ordinal,
            meta,
        } => {
            let text = read_text(text, file)?;
            let input = build_input(text, document_id, ordinal, meta);
            let outcome = bootstrap::retry_policy(&config)
                .ingest(&retriever, input)
                .await?;
            if outcome.created {
                println!("{}", outcome.chunk_id);
            } else {
                println!("{} (already stored)", outcome.chunk_id);
            }
            if !outcome.indexed_vector {
                warn!(chunk = %outcome.chunk_id, "embedding has zero magnitude; chunk is keyword-only");
            }
            Ok(())
        }
        Commands::Delete { chunk_id } => {
            let deleted = retriever.delete(&ChunkId::from(chunk_id.as_str())).await?;
            println!("{}", if deleted { "deleted" } else { "not found" });
            Ok(())
        }
        Commands::DeleteDocument { document_id } => {
            let deleted = retriever.delete_document(&document_id).await?;
            println!("deleted {deleted} chunk(s) of {document_id}");
            Ok(())
        }
        Commands::Query {
            text,
            top_k,
            mode,
            format,
        } => {
            let defaults = bootstrap::query_defaults(&config)?;
            let response = retriever
                .query(
                    &text,
                    top_k.unwrap_or(defaults.top_k),
                    mode.unwrap_or(defaults.mode),
                )
                .await?;
            print_query(&response, &format)
        }
        Commands::Stats { format } => {
            let stats = retriever.stats().await?;
            print_stats(&stats, &format)
        }
        Commands::Rebuild => {
            let report = retriever.rebuild().await?;
            println!(
                "{:?} rebuild at version {} ({} chunks, {} ms)",
                report.kind,
                report.version,
                report.chunk_count,
                report.duration.as_millis()
            );
            Ok(())
        }
        Commands::Serve { .. } => Ok(()),
    };
    retriever.shutdown();
    result
}

async fn serve(config: &Config, host: Option<String>, port: Option<u16>) -> Result<(), BoxError> {
    info!("Starting ragvault v{}", env!("CARGO_PKG_VERSION"));

    let retriever = bootstrap::open_retriever(config).await?;
    let state = AppState::new(retriever)
        .with_retry(bootstrap::retry_policy(config))
        .with_defaults(bootstrap::query_defaults(config)?);

    let server_config = ServerConfig::new(
        host.unwrap_or_else(|| config.server.host.clone()),
        port.unwrap_or(config.server.port),
    );
    let server = ApiServer::new(server_config, Arc::new(state));
    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}

fn read_text(text: Option<String>, file: Option<PathBuf>) -> Result<String, BoxError> {
    match (text, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => Ok(std::fs::read_to_string(&path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?),
        (None, None) => Err("either TEXT or --file is required".into()),
    }
}

fn build_input(
    text: String,
    document_id: Option<String>,
    ordinal: Option<u32>,
    meta: Vec<(String, Value)>,
) -> ChunkInput {
    let mut input = ChunkInput::from_metadata(text, meta.into_iter().collect());
    if let Some(document_id) = document_id {
        input.document_id = document_id;
    }
    if let Some(ordinal) = ordinal {
        input.ordinal = ordinal;
    }
    input
}

fn print_query(response: &QueryResponse, format: &str) -> Result<(), BoxError> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    for warning in &response.warnings {
        eprintln!("warning: {warning}");
    }
    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!("{:<5} {:<10} {:<16} {:<12} {}", "RANK", "SCORE", "CHUNK", "SOURCES", "TEXT");
    println!("{}", "-".repeat(80));
    for result in &response.results {
        let sources = result
            .sources
            .iter()
            .map(|hit| match hit.source {
                Source::Vector => format!("v#{}", hit.rank),
                Source::Keyword => format!("k#{}", hit.rank),
            })
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "{:<5} {:<10.4} {:<16} {:<12} {}",
            result.rank,
            result.score,
            result.chunk_id.short(),
            sources,
            preview(&result.text, 60)
        );
    }
    if response.mode != QueryMode::Vector {
        if let Some(version) = response.snapshot_version {
            println!("(snapshot v{version}, store v{})", response.as_of_version);
        }
    }
    Ok(())
}

fn print_stats(stats: &RetrieverStats, format: &str) -> Result<(), BoxError> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }

    let optional = |value: Option<u64>| value.map_or_else(|| "-".to_string(), |v| v.to_string());
    println!("{:<26} {}", "chunks", stats.chunk_count);
    println!("{:<26} {}", "index freshness", stats.index_freshness);
    println!("{:<26} {}", "store version", stats.store_version);
    println!("{:<26} {}", "snapshot version", optional(stats.snapshot_version));
    println!(
        "{:<26} {}",
        "persisted snapshot version",
        optional(stats.persisted_snapshot_version)
    );
    println!(
        "{:<26} {}",
        "last rebuild",
        match (stats.last_rebuild_kind, stats.last_rebuild_duration_ms) {
            (Some(kind), Some(ms)) => format!("{kind:?} in {ms} ms"),
            _ => "-".to_string(),
        }
    );
    println!("{:<26} {}", "vector entries", stats.vector_entries);
    println!("{:<26} {}", "pending vector removals", stats.vector_pending_removals);
    println!("{:<26} {}", "zero-vector chunks", stats.zero_vector_chunks);
    println!("{:<26} {}", "dimension", stats.dimension);
    Ok(())
}

/// First `max` characters of `text` on one line.
fn preview(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}
