//! Service configuration.
//!
//! Loaded from an optional YAML file, then overridden from the environment.

use crate::{IngestOptions, PersistencePolicy, SearchOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use video_search_embeddings::EmbeddingConfig;
use video_search_scene::{SamplingConfig, SceneDetectorConfig};
use video_search_storage::QdrantConfig;
use video_search_transcription::TranscriptionConfig;

/// Environment variable naming the YAML config file
pub const CONFIG_ENV: &str = "VIDEO_SEARCH_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidOverride { key: String, value: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub embedding: EmbeddingConfig,
    pub transcription: TranscriptionSection,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address of the HTTP server
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Parent directory of per-request working areas
    pub work_root: PathBuf,
    /// Frames sampled per second within a scene
    pub target_fps: f64,
    /// scdet score (0-100) at which a cut is reported
    pub scene_threshold: f64,
    pub min_scene_duration: f64,
    /// Language hint for transcription, `None` for auto-detection
    pub language: Option<String>,
    /// Require a completion marker before treating a source as ingested
    pub completeness_marker: bool,
    pub text_persistence: PersistencePolicy,
    pub image_persistence: PersistencePolicy,
    pub verify_writes: bool,
    /// Upper bound for `n_results`
    pub max_results: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let ingest = IngestOptions::default();
        let scene = SceneDetectorConfig::default();
        Self {
            work_root: ingest.work_root,
            target_fps: SamplingConfig::default().target_fps,
            scene_threshold: scene.threshold,
            min_scene_duration: scene.min_scene_duration,
            language: ingest.language,
            completeness_marker: ingest.completeness_marker,
            text_persistence: ingest.text_policy,
            image_persistence: ingest.image_policy,
            verify_writes: ingest.verify_writes,
            max_results: SearchOptions::default().max_results,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            work_root: self.work_root.clone(),
            language: self.language.clone(),
            completeness_marker: self.completeness_marker,
            text_policy: self.text_persistence,
            image_policy: self.image_persistence,
            verify_writes: self.verify_writes,
        }
    }

    #[must_use]
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            max_results: self.max_results,
            work_root: self.work_root.clone(),
        }
    }

    #[must_use]
    pub fn scene_detector(&self) -> SceneDetectorConfig {
        SceneDetectorConfig {
            threshold: self.scene_threshold,
            min_scene_duration: self.min_scene_duration,
            ..SceneDetectorConfig::default()
        }
    }

    #[must_use]
    pub fn sampling(&self) -> SamplingConfig {
        SamplingConfig {
            target_fps: self.target_fps,
            ..SamplingConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSection {
    /// Whisper GGML model file
    pub model_path: PathBuf,
    #[serde(flatten)]
    pub options: TranscriptionConfig,
}

impl Default for TranscriptionSection {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/whisper/ggml-base.en.bin"),
            options: TranscriptionConfig::default(),
        }
    }
}

/// Vector store backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    Local { path: PathBuf },
    Qdrant(QdrantConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Local {
            path: PathBuf::from("store_emb/index.json"),
        }
    }
}

impl ServiceConfig {
    /// Read `path` (or the file named by `VIDEO_SEARCH_CONFIG`) and apply
    /// environment overrides. Without a file the defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Apply `VIDEO_SEARCH_*`, `QDRANT_*` and `API_SERVER_ADDR` overrides read through `lookup`
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(addr) = lookup("API_SERVER_ADDR") {
            self.server.addr = addr;
        }
        if let Some(root) = lookup("VIDEO_SEARCH_WORK_ROOT") {
            self.pipeline.work_root = PathBuf::from(root);
        }
        if let Some(language) = lookup("VIDEO_SEARCH_LANGUAGE") {
            self.pipeline.language = Some(language).filter(|l| !l.trim().is_empty());
        }
        if let Some(value) = lookup("VIDEO_SEARCH_TARGET_FPS") {
            self.pipeline.target_fps = parse_override("VIDEO_SEARCH_TARGET_FPS", &value)?;
        }
        if let Some(value) = lookup("VIDEO_SEARCH_SCENE_THRESHOLD") {
            self.pipeline.scene_threshold = parse_override("VIDEO_SEARCH_SCENE_THRESHOLD", &value)?;
        }
        if let Some(model) = lookup("VIDEO_SEARCH_CLIP_MODEL") {
            self.embedding.model_path = model;
        }
        if let Some(tokenizer) = lookup("VIDEO_SEARCH_CLIP_TOKENIZER") {
            self.embedding.tokenizer_path = tokenizer;
        }
        if let Some(model) = lookup("VIDEO_SEARCH_WHISPER_MODEL") {
            self.transcription.model_path = PathBuf::from(model);
        }

        if let Some(path) = lookup("VIDEO_SEARCH_STORE_PATH") {
            self.store = StoreConfig::Local {
                path: PathBuf::from(path),
            };
        }
        if let Some(url) = lookup("QDRANT_URL") {
            match &mut self.store {
                StoreConfig::Qdrant(qdrant) => qdrant.url = url,
                StoreConfig::Local { .. } => {
                    self.store = StoreConfig::Qdrant(QdrantConfig {
                        url,
                        ..QdrantConfig::default()
                    });
                }
            }
        }
        if let (Some(key), StoreConfig::Qdrant(qdrant)) = (lookup("QDRANT_API_KEY"), &mut self.store)
        {
            qdrant.api_key = Some(key);
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride {
            key: key.to_string(),
            value: value.to_string(),
        })
}
