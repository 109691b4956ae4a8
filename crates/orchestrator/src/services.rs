//! Wiring of concrete adapters from a [`ServiceConfig`].

use crate::{
    Collaborators, IngestionOrchestrator, QueryOrchestrator, ServiceConfig, StoreConfig,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use video_search_audio::{AudioConfig, FfmpegAudioExtractor};
use video_search_embeddings::{ImageEncoder, TextEncoder};
use video_search_ingestion::UrlRoutingFetcher;
use video_search_scene::FfmpegSceneSegmenter;
use video_search_storage::{LocalVectorStore, QdrantConfig, QdrantVectorStore, VectorStore};
use video_search_transcription::Transcriber;

/// Everything a front end needs, built once at startup
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn VectorStore>,
    pub ingest: Arc<IngestionOrchestrator>,
    pub search: Arc<QueryOrchestrator>,
}

impl Services {
    /// Open the store and load the models named in `config`
    pub async fn from_config(config: &ServiceConfig) -> Result<Self> {
        let store = open_store(config).await?;
        let (text_encoder, image_encoder) = load_encoders(config)?;
        let transcriber = load_transcriber(config)?;

        let collaborators = Collaborators {
            fetcher: Arc::new(UrlRoutingFetcher::default()),
            audio: Arc::new(FfmpegAudioExtractor::new(AudioConfig::default())),
            transcriber,
            segmenter: Arc::new(FfmpegSceneSegmenter::new(
                config.pipeline.scene_detector(),
                config.pipeline.sampling(),
            )),
            text_encoder,
            image_encoder,
            store,
        };
        Ok(Self::from_collaborators(collaborators, config))
    }

    /// Build the orchestrators around already constructed collaborators
    #[must_use]
    pub fn from_collaborators(collaborators: Collaborators, config: &ServiceConfig) -> Self {
        let search = QueryOrchestrator::new(
            Arc::clone(&collaborators.text_encoder),
            Arc::clone(&collaborators.image_encoder),
            Arc::clone(&collaborators.store),
            config.pipeline.search_options(),
        );
        let store = Arc::clone(&collaborators.store);
        let ingest = IngestionOrchestrator::new(collaborators, config.pipeline.ingest_options());
        Self {
            store,
            ingest: Arc::new(ingest),
            search: Arc::new(search),
        }
    }
}

async fn open_store(config: &ServiceConfig) -> Result<Arc<dyn VectorStore>> {
    let dimension = config.embedding.dimension;
    match &config.store {
        StoreConfig::Local { path } => {
            info!("Using local vector store at {}", path.display());
            let store = LocalVectorStore::open(path, dimension)
                .await
                .with_context(|| format!("Failed to open local store {}", path.display()))?;
            Ok(Arc::new(store))
        }
        StoreConfig::Qdrant(qdrant) => {
            info!("Using Qdrant at {} ({})", qdrant.url, qdrant.collection);
            let store = QdrantVectorStore::connect(QdrantConfig {
                vector_dim: dimension as u64,
                ..qdrant.clone()
            })
            .await
            .with_context(|| format!("Failed to connect to Qdrant at {}", qdrant.url))?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(feature = "onnx")]
fn load_encoders(config: &ServiceConfig) -> Result<(Arc<dyn TextEncoder>, Arc<dyn ImageEncoder>)> {
    let clip = Arc::new(video_search_embeddings::ClipEmbedder::new(
        config.embedding.clone(),
    )?);
    let text: Arc<dyn TextEncoder> = clip.clone();
    let image: Arc<dyn ImageEncoder> = clip;
    Ok((text, image))
}

#[cfg(not(feature = "onnx"))]
fn load_encoders(_config: &ServiceConfig) -> Result<(Arc<dyn TextEncoder>, Arc<dyn ImageEncoder>)> {
    anyhow::bail!("built without the `onnx` feature: no embedding model available")
}

#[cfg(feature = "whisper")]
fn load_transcriber(config: &ServiceConfig) -> Result<Arc<dyn Transcriber>> {
    let section = &config.transcription;
    let transcriber = video_search_transcription::WhisperTranscriber::new(
        &section.model_path,
        section.options.clone(),
    )
    .with_context(|| format!("Failed to load Whisper model {}", section.model_path.display()))?;
    Ok(Arc::new(transcriber))
}

#[cfg(not(feature = "whisper"))]
fn load_transcriber(_config: &ServiceConfig) -> Result<Arc<dyn Transcriber>> {
    anyhow::bail!("built without the `whisper` feature: no speech-to-text model available")
}
