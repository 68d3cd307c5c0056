//! ragvault - hybrid vector + BM25 retrieval engine
//!
//! Main entry point for the ragvault CLI and HTTP server.

mod bootstrap;
mod cli;
mod commands;

use clap::Parser;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use ragvault_config::{Config, ConfigLoader, ConfigValidator, LoggingConfig};

use crate::bootstrap::BoxError;
use crate::cli::Cli;

/// Initialize tracing with console and (optionally) file output.
///
/// `RUST_LOG` takes precedence over `[logging].level`. Files rotate daily
/// under the configured log directory.
fn init_tracing(logging: &LoggingConfig) -> Result<(), BoxError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    // Console output goes to stderr so query results on stdout stay clean.
    let console = fmt::layer()
        .with_target(true)
        .with_ansi(true)
        .with_writer(std::io::stderr);

    let file = if logging.file {
        let log_dir = logging.log_dir();
        std::fs::create_dir_all(&log_dir)?;
        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("ragvault")
            .filename_suffix("log")
            .max_log_files(30)
            .build(&log_dir)?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // The worker flushes on drop, so keep it for the whole process.
        static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
            std::sync::OnceLock::new();
        let _ = GUARD.set(guard);

        Some(fmt::layer().with_writer(non_blocking).with_ansi(false).boxed())
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .init();

    Ok(())
}

fn validate(config: &Config) -> Result<(), BoxError> {
    let warnings = ConfigValidator::validate(config)?.into_result()?;
    for warning in warnings {
        warn!("config {}: {}", warning.path, warning.message);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    let config = match ConfigLoader::load_or_default(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&LoggingConfig::default())?;
            return Err(e.into());
        }
    };
    init_tracing(&config.logging)?;
    validate(&config)?;
    info!(config = %cli.config.display(), "configuration loaded");

    commands::run(cli.command, config).await
}
