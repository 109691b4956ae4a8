//! API Server Binary Entry Point

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use video_search_api_server::{start_server, ApiState};
use video_search_orchestrator::{ServiceConfig, Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "video_search=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // File from VIDEO_SEARCH_CONFIG (if set), then environment overrides
    let config = ServiceConfig::load(None).context("Failed to load configuration")?;
    let services = Services::from_config(&config).await?;

    tracing::info!("Starting Video Search API Server");
    start_server(&config.server.addr, ApiState::new(services)).await?;

    Ok(())
}
