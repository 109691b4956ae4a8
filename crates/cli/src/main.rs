//! Video Search CLI
//!
//! Ingest videos, query them, or run the HTTP server, all from one
//! configuration.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use video_search_orchestrator::{ServiceConfig, Services, CONFIG_ENV};

mod commands;

use commands::embed::EmbedCommand;
use commands::search::SearchCommand;
use commands::serve::ServeCommand;

#[derive(Parser)]
#[command(
    name = "video-search",
    version,
    about = "Search inside videos by text or image",
    long_about = "Index a video's transcript and scene frames into a vector store, then find\n\
                  the moments that match a sentence or a picture.",
    after_help = "EXAMPLES:\n  \
                  # Index a video (YouTube or a direct media link)\n  \
                  video-search embed https://www.youtube.com/watch?v=dQw4w9WgXcQ\n\n  \
                  # Find where something is said\n  \
                  video-search search https://www.youtube.com/watch?v=dQw4w9WgXcQ --text \"never gonna\"\n\n  \
                  # Find frames that look like a picture\n  \
                  video-search search <URL> --image ./query.jpg --output-from image -k 3\n\n  \
                  # Run the HTTP API\n  \
                  video-search serve --addr 127.0.0.1:8000"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML configuration file
    #[arg(short, long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download, transcribe, segment and index a video
    Embed(EmbedCommand),

    /// Query an indexed video and print matching timestamps
    Search(SearchCommand),

    /// Run the HTTP API server
    Serve(ServeCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("video_search={log_level},tower_http=debug")));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config =
        ServiceConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let services = Services::from_config(&config).await?;

    match cli.command {
        Commands::Embed(cmd) => cmd.execute(&services).await,
        Commands::Search(cmd) => cmd.execute(&services).await,
        Commands::Serve(cmd) => cmd.execute(&config, services).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_arguments() {
        let cli = Cli::try_parse_from([
            "video-search",
            "search",
            "https://example.com/a.mp4",
            "--text",
            "a red car",
            "-k",
            "3",
            "--output-from",
            "both",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Search(_)));

        // Exactly one query kind
        assert!(Cli::try_parse_from(["video-search", "search", "https://example.com/a.mp4"]).is_err());
        assert!(Cli::try_parse_from([
            "video-search",
            "search",
            "https://example.com/a.mp4",
            "--text",
            "x",
            "--image",
            "q.jpg",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "video-search",
            "search",
            "https://example.com/a.mp4",
            "--text",
            "x",
            "--output-from",
            "audio",
        ])
        .is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from([
            "video-search",
            "embed",
            "https://example.com/a.mp4",
            "--config",
            "service.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("service.yaml")));
    }
}
