//! TagEngine CLI - probe, query and watch a TagEngine tag server.
//!
//! This is the main binary entry point. See the `tagengine` library for the
//! connector itself; the binary only wires it to the command line.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use tagengine::{commands, SessionConfig, TagEngine, TagEngineService};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "tagengine")]
#[command(version)]
#[command(about = "WebSocket connector for TagEngine tag servers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a tag server accepts WebSocket connections
    Probe {
        /// WebSocket URL of the tag server
        url: String,
        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Run one query, e.g. '{"operation":"get_value","tag_ids":"plant1/temp"}'
    Run {
        /// WebSocket URL of the tag server
        url: String,
        /// Query options as JSON
        query: String,
        /// How long to wait for the session to open before running
        #[arg(long, default_value_t = 5000)]
        connect_timeout_ms: u64,
        /// How long to keep the connection after the query (lets pushes arrive)
        #[arg(long, default_value_t = 200)]
        settle_ms: u64,
    },
    /// Subscribe to tags and print their values until Ctrl-C
    Watch {
        /// WebSocket URL of the tag server
        url: String,
        /// Comma-separated tag ids ("#" for everything cached)
        #[arg(long)]
        tags: String,
        /// Print interval in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable JSON.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mut config = SessionConfig::from_env();
    if let Commands::Probe {
        timeout_ms: Some(ms),
        ..
    } = &cli.command
    {
        config.probe_timeout = Duration::from_millis(*ms);
    }
    let service = TagEngineService::new(Arc::new(TagEngine::new(config)));

    let succeeded = match cli.command {
        Commands::Probe { url, .. } => commands::probe(&service, &url).await?,
        Commands::Run {
            url,
            query,
            connect_timeout_ms,
            settle_ms,
        } => {
            commands::run::execute(
                &service,
                &url,
                &query,
                Duration::from_millis(connect_timeout_ms),
                Duration::from_millis(settle_ms),
            )
            .await?
        }
        Commands::Watch {
            url,
            tags,
            interval_ms,
        } => {
            commands::watch::execute(&service, &url, &tags, Duration::from_millis(interval_ms))
                .await?;
            true
        }
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
