use std::fmt;
use thiserror::Error;

/// Steps of an ingestion run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngestStage {
    /// Completion marker lookup and partial-run repair
    Preflight,
    Acquisition,
    AudioExtraction,
    Transcription,
    /// Transcript embedding and persistence
    TextIndexing,
    Segmentation,
    /// Frame embedding and persistence
    FrameIndexing,
    /// Completion marker write
    Finalize,
}

impl IngestStage {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::Acquisition => "acquisition",
            Self::AudioExtraction => "audio_extraction",
            Self::Transcription => "transcription",
            Self::TextIndexing => "text_indexing",
            Self::Segmentation => "segmentation",
            Self::FrameIndexing => "frame_indexing",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ingestion failure, tagged with the stage that produced it
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Failed to create working directory: {0}")]
    Workspace(String),

    #[error("Video acquisition failed: {0}")]
    Acquisition(String),

    #[error("Audio extraction failed: {0}")]
    AudioExtraction(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Scene segmentation failed: {0}")]
    Segmentation(String),

    #[error("Embedding failed during {stage}: {message}")]
    Embedding { stage: IngestStage, message: String },

    #[error("Persistence failed during {stage}: {message}")]
    Persistence { stage: IngestStage, message: String },
}

impl IngestError {
    /// Name of the failing stage
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Workspace(_) => "workspace",
            Self::Acquisition(_) => IngestStage::Acquisition.name(),
            Self::AudioExtraction(_) => IngestStage::AudioExtraction.name(),
            Self::Transcription(_) => IngestStage::Transcription.name(),
            Self::Segmentation(_) => IngestStage::Segmentation.name(),
            Self::Embedding { stage, .. } | Self::Persistence { stage, .. } => stage.name(),
        }
    }

    /// True for errors caused by the request rather than the system
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Search failure
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Video not found: {0}")]
    NotFound(String),

    #[error("Query embedding failed: {0}")]
    Embedding(String),

    #[error("Vector store query failed: {0}")]
    Persistence(String),

    #[error("Failed to fetch query image: {0}")]
    ImageFetch(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(IngestError::Acquisition("x".into()).stage(), "acquisition");
        assert_eq!(IngestError::Validation("x".into()).stage(), "validation");
        assert_eq!(
            IngestError::Persistence {
                stage: IngestStage::TextIndexing,
                message: "x".into(),
            }
            .stage(),
            "text_indexing"
        );
    }

    #[test]
    fn test_error_messages_carry_stage() {
        let err = IngestError::Embedding {
            stage: IngestStage::FrameIndexing,
            message: "model crashed".into(),
        };
        assert_eq!(
            err.to_string(),
            "Embedding failed during frame_indexing: model crashed"
        );
        assert!(!err.is_client_error());
    }
}
