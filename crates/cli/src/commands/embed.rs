//! `video-search embed`

use anyhow::Result;
use clap::Args;
use std::time::Instant;
use video_search_orchestrator::{IngestOutcome, Services};

#[derive(Args)]
pub struct EmbedCommand {
    /// Source video URL
    #[arg(value_name = "URL")]
    url: String,
}

impl EmbedCommand {
    pub async fn execute(self, services: &Services) -> Result<()> {
        let start = Instant::now();
        let outcome = services.ingest.ingest(&self.url).await?;

        match outcome {
            IngestOutcome::Ingested {
                text_records,
                image_records,
                image_failures,
                repaired,
            } => {
                if repaired {
                    println!("Removed records of an unfinished earlier run");
                }
                println!(
                    "Embedded {} transcript segments and {} frames in {:.1}s",
                    text_records,
                    image_records,
                    start.elapsed().as_secs_f64()
                );
                if image_failures > 0 {
                    println!("{image_failures} frames could not be embedded");
                }
            }
            IngestOutcome::AlreadyIngested => println!("Already embedded: {}", self.url),
        }
        Ok(())
    }
}
