//! `video-search search`

use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;
use url::Url;
use video_search_api_server::download_image;
use video_search_orchestrator::{
    ImageQuery, OutputScope, QueryPayload, SearchRequest, Services, DEFAULT_RESULTS,
};

#[derive(Args)]
pub struct SearchCommand {
    /// URL of an embedded video
    #[arg(value_name = "URL")]
    url: String,

    /// Text query
    #[arg(long, conflicts_with = "image", required_unless_present = "image")]
    text: Option<String>,

    /// Image query: a local file or an http(s) URL
    #[arg(long)]
    image: Option<String>,

    /// Maximum number of timestamps
    #[arg(short, default_value_t = DEFAULT_RESULTS)]
    k: usize,

    /// Records to search: text, image, or both (text of every video)
    #[arg(long, default_value = "text")]
    output_from: OutputScope,

    /// Print the result as a JSON array
    #[arg(long)]
    json: bool,
}

impl SearchCommand {
    pub async fn execute(self, services: &Services) -> Result<()> {
        let query = match (self.text, self.image) {
            (Some(text), _) => QueryPayload::Text(text),
            (None, Some(image)) => QueryPayload::Image(image_query(&image).await?),
            (None, None) => anyhow::bail!("Provide --text or --image"),
        };

        let results = services
            .search
            .search(SearchRequest {
                source_url: self.url,
                query,
                k: self.k,
                output_from: self.output_from,
            })
            .await?;

        if self.json {
            println!("{}", serde_json::to_string(&results)?);
        } else if results.is_empty() {
            println!("No matches");
        } else {
            for timestamp in results {
                println!("{timestamp}");
            }
        }
        Ok(())
    }
}

async fn image_query(image: &str) -> Result<ImageQuery> {
    let is_remote = Url::parse(image).is_ok_and(|url| matches!(url.scheme(), "http" | "https"));
    if is_remote {
        let bytes = download_image(image)
            .await
            .with_context(|| format!("Failed to fetch query image {image}"))?;
        return Ok(ImageQuery::Bytes(bytes));
    }

    let path = PathBuf::from(image);
    if !path.is_file() {
        anyhow::bail!("Query image does not exist: {}", path.display());
    }
    Ok(ImageQuery::Path(path))
}
