//! CLI definitions for ragvault.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use ragvault_protocols::QueryMode;

/// ragvault CLI.
#[derive(Parser)]
#[command(name = "ragvault")]
#[command(about = "Hybrid vector + BM25 retrieval over a local chunk corpus")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Ingest one chunk
    Ingest {
        /// Chunk text
        #[arg(conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,

        /// Read the chunk text from a file
        #[arg(long)]
        file: Option<PathBuf>,

        /// Owning document id
        #[arg(long)]
        document_id: Option<String>,

        /// Position within the document
        #[arg(long)]
        ordinal: Option<u32>,

        /// Metadata entry (repeatable), e.g. --meta source=guide.md
        #[arg(long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, Value)>,
    },

    /// Delete one chunk
    Delete {
        /// Chunk id
        chunk_id: String,
    },

    /// Delete every chunk of a document
    DeleteDocument {
        /// Document id
        document_id: String,
    },

    /// Run a query
    Query {
        /// Query text
        text: String,

        /// Number of results (defaults to retriever.default_top_k)
        #[arg(long)]
        top_k: Option<usize>,

        /// Retrieval mode (hybrid, vector, keyword)
        #[arg(long)]
        mode: Option<QueryMode>,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Show index statistics
    Stats {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Rebuild the keyword snapshot
    Rebuild,

    /// Run the HTTP API server
    Serve {
        /// Server host (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Server port (defaults to server.port)
        #[arg(long)]
        port: Option<u16>,
    },
}

/// Parse `key=value`. Numbers, booleans and null are kept typed; anything
/// else is a string.
pub(crate) fn parse_meta(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty metadata key in '{raw}'"));
    }
    let value = match serde_json::from_str::<Value>(value) {
        Ok(parsed) if !parsed.is_object() && !parsed.is_array() && !parsed.is_string() => parsed,
        _ => Value::String(value.to_string()),
    };
    Ok((key.to_string(), value))
}
