//! `video-search serve`

use anyhow::Result;
use clap::Args;
use video_search_api_server::{start_server, ApiState};
use video_search_orchestrator::{ServiceConfig, Services};

#[derive(Args)]
pub struct ServeCommand {
    /// Bind address (defaults to `server.addr` from the configuration)
    #[arg(long)]
    addr: Option<String>,
}

impl ServeCommand {
    pub async fn execute(self, config: &ServiceConfig, services: Services) -> Result<()> {
        let addr = self.addr.unwrap_or_else(|| config.server.addr.clone());
        start_server(&addr, ApiState::new(services)).await?;
        Ok(())
    }
}
