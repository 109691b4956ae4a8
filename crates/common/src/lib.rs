/// Common types and utilities for video search ingestion and retrieval
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

/// Processing errors shared by the media collaborators
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No audio stream found")]
    NoAudioStream,

    #[error("No video stream found")]
    NoVideoStream,

    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    #[error("Required tool not found on PATH: {0}")]
    ToolNotFound(String),

    #[error("FFmpeg error: {0}")]
    FFmpegError(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<image::ImageError> for ProcessingError {
    fn from(err: image::ImageError) -> Self {
        ProcessingError::ImageError(err.to_string())
    }
}

/// Result type for processing operations
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// A source video, identified by its origin URL.
///
/// The URL is the natural key of every record derived from the video, so it is
/// normalized once (surrounding whitespace trimmed) and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Source(String);

impl Source {
    /// Validate and normalize a source URL. Only `http` and `https` URLs with a host are accepted.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ProcessingError::InvalidInput(
                "source URL must not be empty".to_string(),
            ));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(ProcessingError::InvalidInput(format!(
                "source URL contains whitespace: {}",
                trimmed
            )));
        }

        let parsed = Url::parse(trimmed).map_err(|e| {
            ProcessingError::InvalidInput(format!("invalid source URL '{}': {}", trimmed, e))
        })?;
        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(ProcessingError::InvalidInput(format!(
                    "unsupported URL scheme '{}' (expected http or https)",
                    scheme
                )))
            }
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(ProcessingError::InvalidInput(format!(
                "source URL has no host: {}",
                trimmed
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased path of the URL with query and fragment removed
    #[must_use]
    pub fn path(&self) -> String {
        Url::parse(&self.0)
            .map(|url| url.path().to_ascii_lowercase())
            .unwrap_or_default()
    }
}

impl TryFrom<String> for Source {
    type Error = ProcessingError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<Source> for String {
    fn from(source: Source) -> Self {
        source.0
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of content an embedding was computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

impl Modality {
    /// Tag used in record ids and filters
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Image => "image",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timestamped span of recognized speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_offset_seconds: f64,
    pub end_offset_seconds: f64,
    pub text: String,
}

/// A half-open `[start, end)` interval of visually continuous content
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneInterval {
    pub index: u32,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl SceneInterval {
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}

/// A sampled frame written to the working area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneFrame {
    pub scene_index: u32,
    pub frame_index_within_scene: u32,
    /// Absolute frame number in the source video
    pub frame_id: u64,
    pub timestamp_seconds: f64,
    pub image_path: PathBuf,
}

/// Modality-specific part of a record's metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "modality", rename_all = "lowercase")]
pub enum ModalityDetail {
    Text {
        text: String,
    },
    Image {
        scene_index: u32,
        frame_index: u32,
        frame_id: u64,
    },
}

/// Metadata stored alongside every vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub source: Source,
    /// Position in the source video the record points at
    pub anchor_seconds: f64,
    #[serde(flatten)]
    pub detail: ModalityDetail,
}

impl RecordMetadata {
    #[must_use]
    pub fn text(source: &Source, segment: &TranscriptSegment) -> Self {
        Self {
            source: source.clone(),
            anchor_seconds: segment.start_offset_seconds,
            detail: ModalityDetail::Text {
                text: segment.text.clone(),
            },
        }
    }

    #[must_use]
    pub fn image(source: &Source, frame: &SceneFrame) -> Self {
        Self {
            source: source.clone(),
            anchor_seconds: frame.timestamp_seconds,
            detail: ModalityDetail::Image {
                scene_index: frame.scene_index,
                frame_index: frame.frame_index_within_scene,
                frame_id: frame.frame_id,
            },
        }
    }

    #[must_use]
    pub fn modality(&self) -> Modality {
        match self.detail {
            ModalityDetail::Text { .. } => Modality::Text,
            ModalityDetail::Image { .. } => Modality::Image,
        }
    }
}

/// A persisted (id, vector, metadata) triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// Derive the deterministic record id `{source}_{index}_{modality}`.
#[must_use]
pub fn record_id(source: &Source, sequence_index: usize, modality: Modality) -> String {
    format!("{}_{}_{}", source.as_str(), sequence_index, modality.as_str())
}

/// Render an offset as zero-padded `HH:MM:SS`.
///
/// Sub-second precision is truncated and hours grow past 99 rather than wrapping.
/// Negative and non-finite offsets render as `00:00:00`.
#[must_use]
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.trunc() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Stream type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Video,
    Audio,
    Subtitle,
    Data,
}

/// Information about a media stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    pub stream_type: StreamType,
    pub codec: String,
    pub bitrate: u64,

    // Video-specific fields
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub frame_count: Option<u64>,

    // Audio-specific fields
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
}

/// Media file information as reported by the prober
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub format: String,
    pub duration: f64,
    pub streams: Vec<StreamInfo>,
    pub metadata: HashMap<String, String>,
}

impl MediaInfo {
    /// Find the first video stream
    #[must_use]
    pub fn video_stream(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .find(|s| s.stream_type == StreamType::Video)
    }

    /// Find the first audio stream
    #[must_use]
    pub fn audio_stream(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .find(|s| s.stream_type == StreamType::Audio)
    }

    #[must_use]
    pub fn has_video(&self) -> bool {
        self.video_stream().is_some()
    }

    #[must_use]
    pub fn has_audio(&self) -> bool {
        self.audio_stream().is_some()
    }

    /// Frame rate of the first video stream, if known and positive
    #[must_use]
    pub fn fps(&self) -> Option<f64> {
        self.video_stream()
            .and_then(|s| s.fps)
            .filter(|fps| fps.is_finite() && *fps > 0.0)
    }
}
