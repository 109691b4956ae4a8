//! Cross-modal search over ingested sources.

use crate::SearchError;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use video_search_common::{format_timestamp, Source};
use video_search_embeddings::{l2_norm, normalize_vector, ImageEncoder, TextEncoder};
use video_search_storage::{OutputScope, VectorStore};

/// Default number of results
pub const DEFAULT_RESULTS: usize = 5;

/// Image given as a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageQuery {
    /// Encoded image bytes (JPEG, PNG, ...)
    Bytes(Vec<u8>),
    /// Image file already on local disk
    Path(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPayload {
    Text(String),
    Image(ImageQuery),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub source_url: String,
    pub query: QueryPayload,
    /// Maximum number of results
    pub k: usize,
    pub output_from: OutputScope,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Largest accepted `k`
    pub max_results: usize,
    /// Where query images are staged for the image encoder
    pub work_root: PathBuf,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 100,
            work_root: std::env::temp_dir().join("video-search"),
        }
    }
}

/// Embeds queries and maps store hits to `HH:MM:SS` timestamps.
pub struct QueryOrchestrator {
    text_encoder: Arc<dyn TextEncoder>,
    image_encoder: Arc<dyn ImageEncoder>,
    store: Arc<dyn VectorStore>,
    options: SearchOptions,
}

impl QueryOrchestrator {
    #[must_use]
    pub fn new(
        text_encoder: Arc<dyn TextEncoder>,
        image_encoder: Arc<dyn ImageEncoder>,
        store: Arc<dyn VectorStore>,
        options: SearchOptions,
    ) -> Self {
        Self {
            text_encoder,
            image_encoder,
            store,
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Timestamps of the `k` closest records, closest first.
    pub async fn search(&self, request: SearchRequest) -> Result<Vec<String>, SearchError> {
        let source = Source::parse(&request.source_url)
            .map_err(|e| SearchError::Validation(e.to_string()))?;
        validate_payload(&request.query)?;

        let k = request.k.min(self.options.max_results);
        if k < request.k {
            debug!(
                "Clamping n_results from {} to {}",
                request.k, self.options.max_results
            );
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        if request.output_from.is_source_scoped()
            && !self
                .store
                .exists(&source)
                .await
                .map_err(|e| SearchError::Persistence(e.to_string()))?
        {
            return Err(SearchError::NotFound(source.to_string()));
        }

        let vector = self.embed_query(request.query).await?;
        let filter = request.output_from.filter(&source);
        let hits = self
            .store
            .query(&vector, k, &filter)
            .await
            .map_err(|e| SearchError::Persistence(e.to_string()))?;

        info!(
            "Search on {} ({}) returned {} hits",
            source,
            request.output_from,
            hits.len()
        );
        Ok(hits
            .iter()
            .map(|hit| format_timestamp(hit.metadata.anchor_seconds))
            .collect())
    }

    async fn embed_query(&self, query: QueryPayload) -> Result<Vec<f32>, SearchError> {
        let vector = match query {
            QueryPayload::Text(text) => self
                .text_encoder
                .embed_text(&[text.trim().to_string()])
                .await
                .map_err(|e| SearchError::Embedding(format!("{e:#}")))?
                .into_iter()
                .next(),
            QueryPayload::Image(ImageQuery::Path(path)) => self.embed_image_file(path).await?,
            QueryPayload::Image(ImageQuery::Bytes(bytes)) => {
                // Held until the encoder is done; removed on drop
                let staged = self.stage_image(&bytes).await?;
                self.embed_image_file(staged.path().to_path_buf()).await?
            }
        };

        let mut vector =
            vector.ok_or_else(|| SearchError::Embedding("encoder returned no vector".into()))?;
        let norm = l2_norm(&vector);
        if !norm.is_finite() || norm <= 1e-12 {
            return Err(SearchError::Embedding(
                "query embedding has no direction".into(),
            ));
        }
        normalize_vector(&mut vector);
        Ok(vector)
    }

    async fn embed_image_file(&self, path: PathBuf) -> Result<Option<Vec<f32>>, SearchError> {
        let mut vectors = self
            .image_encoder
            .embed_images(&[path])
            .await
            .map_err(|e| SearchError::Embedding(format!("{e:#}")))?;
        match vectors.pop() {
            Some(Some(vector)) => Ok(Some(vector)),
            Some(None) => Err(SearchError::Validation(
                "query image could not be decoded".into(),
            )),
            None => Ok(None),
        }
    }

    /// Write query image bytes to a temp file named with the detected extension
    async fn stage_image(&self, bytes: &[u8]) -> Result<tempfile::NamedTempFile, SearchError> {
        let format = image::guess_format(bytes)
            .map_err(|e| SearchError::Validation(format!("unrecognized image data: {e}")))?;
        let extension = format.extensions_str().first().copied().unwrap_or("img");

        let root = &self.options.work_root;
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| SearchError::ImageFetch(format!("{}: {}", root.display(), e)))?;

        let mut file = tempfile::Builder::new()
            .prefix("query-")
            .suffix(&format!(".{extension}"))
            .tempfile_in(root)
            .map_err(|e| SearchError::ImageFetch(e.to_string()))?;
        file.write_all(bytes)
            .map_err(|e| SearchError::ImageFetch(e.to_string()))?;
        debug!("Staged query image at {}", file.path().display());
        Ok(file)
    }
}

fn validate_payload(query: &QueryPayload) -> Result<(), SearchError> {
    match query {
        QueryPayload::Text(text) if text.trim().is_empty() => Err(SearchError::Validation(
            "query text must not be empty".into(),
        )),
        QueryPayload::Image(ImageQuery::Bytes(bytes)) if bytes.is_empty() => Err(
            SearchError::Validation("query image must not be empty".into()),
        ),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_payload() {
        assert!(validate_payload(&QueryPayload::Text("  ".into())).is_err());
        assert!(validate_payload(&QueryPayload::Text("a dog".into())).is_ok());
        assert!(validate_payload(&QueryPayload::Image(ImageQuery::Bytes(Vec::new()))).is_err());
        assert!(
            validate_payload(&QueryPayload::Image(ImageQuery::Path(PathBuf::from("q.png"))))
                .is_ok()
        );
    }

    #[test]
    fn test_default_options() {
        let options = SearchOptions::default();
        assert_eq!(options.max_results, 100);
    }
}
