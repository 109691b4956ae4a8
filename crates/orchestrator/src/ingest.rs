//! Ingestion pipeline: URL in, embedding records out.

use crate::stage::{run_stage, PersistSummary, PersistencePolicy, Stage};
use crate::{IngestError, IngestStage, SourceLocks};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use video_search_audio::AudioExtractor;
use video_search_common::{
    record_id, EmbeddingRecord, Modality, RecordMetadata, SceneFrame, Source, TranscriptSegment,
};
use video_search_embeddings::{l2_norm, normalize_vector, ImageEncoder, TextEncoder};
use video_search_ingestion::MediaFetcher;
use video_search_scene::SceneSegmenter;
use video_search_storage::{StorageResult, VectorStore};
use video_search_transcription::{normalize_segments, Transcriber};

/// External capabilities the pipeline drives
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn MediaFetcher>,
    pub audio: Arc<dyn AudioExtractor>,
    pub transcriber: Arc<dyn Transcriber>,
    pub segmenter: Arc<dyn SceneSegmenter>,
    pub text_encoder: Arc<dyn TextEncoder>,
    pub image_encoder: Arc<dyn ImageEncoder>,
    pub store: Arc<dyn VectorStore>,
}

/// Tunables of an ingestion run
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Parent of the per-run temporary working directories
    pub work_root: PathBuf,
    /// Language hint handed to the transcriber
    pub language: Option<String>,
    /// Treat only sources with a completion marker as ingested
    pub completeness_marker: bool,
    pub text_policy: PersistencePolicy,
    pub image_policy: PersistencePolicy,
    /// Read every record back after writing it
    pub verify_writes: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir().join("video-search"),
            language: Some("en".to_string()),
            completeness_marker: true,
            text_policy: PersistencePolicy::Strict,
            image_policy: PersistencePolicy::Lenient,
            verify_writes: false,
        }
    }
}

/// Result of a successful `ingest` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Ingested {
        text_records: usize,
        image_records: usize,
        image_failures: usize,
        /// Records of an earlier, unfinished run were removed first
        repaired: bool,
    },
    AlreadyIngested,
}

/// Sequences the ingestion stages for one source at a time.
pub struct IngestionOrchestrator {
    collaborators: Collaborators,
    options: IngestOptions,
    locks: SourceLocks,
}

impl IngestionOrchestrator {
    #[must_use]
    pub fn new(collaborators: Collaborators, options: IngestOptions) -> Self {
        Self {
            collaborators,
            options,
            locks: SourceLocks::new(),
        }
    }

    #[must_use]
    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Number of sources with an ingestion currently holding their lock
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }

    /// Ingest the video at `source_url`.
    ///
    /// Returns [`IngestOutcome::AlreadyIngested`] without doing any work when the
    /// source is already in the store. The temporary working area is removed on
    /// every exit path, including cancellation.
    pub async fn ingest(&self, source_url: &str) -> Result<IngestOutcome, IngestError> {
        let source =
            Source::parse(source_url).map_err(|e| IngestError::Validation(e.to_string()))?;
        let span = info_span!("ingest", source = %source);
        self.ingest_source(source).instrument(span).await
    }

    async fn ingest_source(&self, source: Source) -> Result<IngestOutcome, IngestError> {
        let _guard = self.locks.acquire(&source).await;

        let repaired = match self.preflight(&source).await? {
            Preflight::Skip => {
                info!("Source already ingested, skipping");
                return Ok(IngestOutcome::AlreadyIngested);
            }
            Preflight::Fresh => false,
            Preflight::Repaired => true,
        };

        let work_dir = self.create_work_dir().await?;
        debug!("Working directory: {}", work_dir.path().display());

        let c = &self.collaborators;
        let dir = work_dir.path();

        let video = run_stage(
            &Acquire {
                fetcher: c.fetcher.as_ref(),
                source: &source,
                dir,
            },
            (),
        )
        .await?;

        let wav = run_stage(
            &ExtractAudio {
                extractor: c.audio.as_ref(),
                dest: dir.join("audio.wav"),
            },
            video.clone(),
        )
        .await?;

        let segments = run_stage(
            &Transcribe {
                transcriber: c.transcriber.as_ref(),
                language: self.options.language.as_deref(),
            },
            wav,
        )
        .await?;

        let text = run_stage(
            &IndexTranscript {
                encoder: c.text_encoder.as_ref(),
                store: c.store.as_ref(),
                source: &source,
                policy: self.options.text_policy,
                verify: self.options.verify_writes,
            },
            segments,
        )
        .await?;

        let frames = run_stage(
            &Segment {
                segmenter: c.segmenter.as_ref(),
                frames_dir: dir.join("frames"),
            },
            video,
        )
        .await?;

        let images = run_stage(
            &IndexFrames {
                encoder: c.image_encoder.as_ref(),
                store: c.store.as_ref(),
                source: &source,
                policy: self.options.image_policy,
                verify: self.options.verify_writes,
            },
            frames,
        )
        .await?;

        c.store
            .mark_complete(&source)
            .await
            .map_err(|e| IngestError::Persistence {
                stage: IngestStage::Finalize,
                message: e.to_string(),
            })?;

        if let Err(e) = work_dir.close() {
            warn!("Failed to remove working directory: {}", e);
        }

        info!(
            "Ingested {} text records, {} image records ({} image failures)",
            text.persisted, images.persisted, images.failed
        );
        Ok(IngestOutcome::Ingested {
            text_records: text.persisted,
            image_records: images.persisted,
            image_failures: images.failed,
            repaired,
        })
    }

    async fn preflight(&self, source: &Source) -> Result<Preflight, IngestError> {
        let store = &self.collaborators.store;
        let persistence = |e: video_search_storage::StorageError| IngestError::Persistence {
            stage: IngestStage::Preflight,
            message: e.to_string(),
        };

        if !self.options.completeness_marker {
            let exists = store.exists(source).await.map_err(persistence)?;
            return Ok(if exists {
                Preflight::Skip
            } else {
                Preflight::Fresh
            });
        }

        if store.is_complete(source).await.map_err(persistence)? {
            return Ok(Preflight::Skip);
        }
        if store.exists(source).await.map_err(persistence)? {
            let removed = store.delete_source(source).await.map_err(persistence)?;
            warn!("Removed {} records left by an unfinished run", removed);
            return Ok(Preflight::Repaired);
        }
        Ok(Preflight::Fresh)
    }

    async fn create_work_dir(&self) -> Result<tempfile::TempDir, IngestError> {
        let root = &self.options.work_root;
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| IngestError::Workspace(format!("{}: {}", root.display(), e)))?;
        tempfile::Builder::new()
            .prefix("ingest-")
            .tempdir_in(root)
            .map_err(|e| IngestError::Workspace(format!("{}: {}", root.display(), e)))
    }
}

enum Preflight {
    Fresh,
    Repaired,
    Skip,
}

struct Acquire<'a> {
    fetcher: &'a dyn MediaFetcher,
    source: &'a Source,
    dir: &'a Path,
}

#[async_trait]
impl<'a> Stage for Acquire<'a> {
    type Input = ();
    type Output = PathBuf;

    fn stage(&self) -> IngestStage {
        IngestStage::Acquisition
    }

    async fn run(&self, _input: ()) -> Result<PathBuf, IngestError> {
        self.fetcher
            .fetch(self.source, self.dir)
            .await
            .map_err(|e| IngestError::Acquisition(e.to_string()))
    }
}

struct ExtractAudio<'a> {
    extractor: &'a dyn AudioExtractor,
    dest: PathBuf,
}

#[async_trait]
impl<'a> Stage for ExtractAudio<'a> {
    type Input = PathBuf;
    type Output = PathBuf;

    fn stage(&self) -> IngestStage {
        IngestStage::AudioExtraction
    }

    async fn run(&self, video: PathBuf) -> Result<PathBuf, IngestError> {
        self.extractor
            .extract(&video, &self.dest)
            .await
            .map_err(|e| IngestError::AudioExtraction(e.to_string()))
    }
}

struct Transcribe<'a> {
    transcriber: &'a dyn Transcriber,
    language: Option<&'a str>,
}

#[async_trait]
impl<'a> Stage for Transcribe<'a> {
    type Input = PathBuf;
    type Output = Vec<TranscriptSegment>;

    fn stage(&self) -> IngestStage {
        IngestStage::Transcription
    }

    async fn run(&self, wav: PathBuf) -> Result<Vec<TranscriptSegment>, IngestError> {
        let segments = self
            .transcriber
            .transcribe(&wav, self.language)
            .await
            .map_err(|e| IngestError::Transcription(e.to_string()))?;
        let segments = normalize_segments(segments);
        info!("Transcribed {} segments", segments.len());
        Ok(segments)
    }
}

struct Segment<'a> {
    segmenter: &'a dyn SceneSegmenter,
    frames_dir: PathBuf,
}

#[async_trait]
impl<'a> Stage for Segment<'a> {
    type Input = PathBuf;
    type Output = Vec<SceneFrame>;

    fn stage(&self) -> IngestStage {
        IngestStage::Segmentation
    }

    async fn run(&self, video: PathBuf) -> Result<Vec<SceneFrame>, IngestError> {
        let scenes = self
            .segmenter
            .segment(&video)
            .await
            .map_err(|e| IngestError::Segmentation(e.to_string()))?;
        let frames = self
            .segmenter
            .sample(&video, &scenes, &self.frames_dir)
            .await
            .map_err(|e| IngestError::Segmentation(e.to_string()))?;
        info!("Sampled {} frames from {} scenes", frames.len(), scenes.len());
        Ok(frames)
    }
}

struct IndexTranscript<'a> {
    encoder: &'a dyn TextEncoder,
    store: &'a dyn VectorStore,
    source: &'a Source,
    policy: PersistencePolicy,
    verify: bool,
}

#[async_trait]
impl<'a> Stage for IndexTranscript<'a> {
    type Input = Vec<TranscriptSegment>;
    type Output = PersistSummary;

    fn stage(&self) -> IngestStage {
        IngestStage::TextIndexing
    }

    async fn run(&self, segments: Vec<TranscriptSegment>) -> Result<PersistSummary, IngestError> {
        if segments.is_empty() {
            warn!("Transcript is empty, no text records");
            return Ok(PersistSummary::default());
        }

        let texts: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();
        let vectors = self
            .encoder
            .embed_text(&texts)
            .await
            .map_err(|e| embedding_error(IngestStage::TextIndexing, &e))?;
        if vectors.len() != segments.len() {
            return Err(IngestError::Embedding {
                stage: IngestStage::TextIndexing,
                message: format!(
                    "encoder returned {} vectors for {} segments",
                    vectors.len(),
                    segments.len()
                ),
            });
        }

        let mut records = Vec::with_capacity(segments.len());
        for (index, (segment, vector)) in segments.iter().zip(vectors).enumerate() {
            let vector = unit_vector(vector).ok_or_else(|| IngestError::Embedding {
                stage: IngestStage::TextIndexing,
                message: format!("zero vector for segment {index}"),
            })?;
            records.push(EmbeddingRecord {
                id: record_id(self.source, index, Modality::Text),
                vector,
                metadata: RecordMetadata::text(self.source, segment),
            });
        }

        let summary = persist_records(self.store, records, self.verify).await;
        self.policy.check(IngestStage::TextIndexing, summary)?;
        Ok(summary)
    }
}

struct IndexFrames<'a> {
    encoder: &'a dyn ImageEncoder,
    store: &'a dyn VectorStore,
    source: &'a Source,
    policy: PersistencePolicy,
    verify: bool,
}

#[async_trait]
impl<'a> Stage for IndexFrames<'a> {
    type Input = Vec<SceneFrame>;
    type Output = PersistSummary;

    fn stage(&self) -> IngestStage {
        IngestStage::FrameIndexing
    }

    async fn run(&self, frames: Vec<SceneFrame>) -> Result<PersistSummary, IngestError> {
        if frames.is_empty() {
            warn!("No frames sampled, no image records");
            return Ok(PersistSummary::default());
        }

        let paths: Vec<PathBuf> = frames.iter().map(|f| f.image_path.clone()).collect();
        let vectors = self
            .encoder
            .embed_images(&paths)
            .await
            .map_err(|e| embedding_error(IngestStage::FrameIndexing, &e))?;
        if vectors.len() != frames.len() {
            return Err(IngestError::Embedding {
                stage: IngestStage::FrameIndexing,
                message: format!(
                    "encoder returned {} vectors for {} frames",
                    vectors.len(),
                    frames.len()
                ),
            });
        }

        let mut unreadable = 0;
        let mut records = Vec::with_capacity(frames.len());
        for (index, (frame, vector)) in frames.iter().zip(vectors).enumerate() {
            // Positions stay tied to the frame list so ids are reproducible
            match vector.and_then(unit_vector) {
                Some(vector) => records.push(EmbeddingRecord {
                    id: record_id(self.source, index, Modality::Image),
                    vector,
                    metadata: RecordMetadata::image(self.source, frame),
                }),
                None => {
                    warn!("No embedding for frame {}", frame.image_path.display());
                    unreadable += 1;
                }
            }
        }

        let mut summary = persist_records(self.store, records, self.verify).await;
        summary.failed += unreadable;
        self.policy.check(IngestStage::FrameIndexing, summary)?;
        Ok(summary)
    }
}

fn embedding_error(stage: IngestStage, e: &anyhow::Error) -> IngestError {
    IngestError::Embedding {
        stage,
        message: format!("{e:#}"),
    }
}

/// Normalize to unit length; `None` for vectors with no direction
fn unit_vector(mut vector: Vec<f32>) -> Option<Vec<f32>> {
    let norm = l2_norm(&vector);
    if !norm.is_finite() || norm <= 1e-12 {
        return None;
    }
    normalize_vector(&mut vector);
    Some(vector)
}

/// Write `records` as one batch; when the batch is refused, retry record by
/// record so failures are counted instead of stopping at the first one
async fn persist_records(
    store: &dyn VectorStore,
    records: Vec<EmbeddingRecord>,
    verify: bool,
) -> PersistSummary {
    let mut summary = PersistSummary::default();
    if records.is_empty() {
        return summary;
    }

    let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
    match store.upsert_many(records.clone()).await {
        Ok(()) => {
            for id in &ids {
                record_outcome(store, id, Ok(()), verify, &mut summary).await;
            }
        }
        Err(e) => {
            warn!(
                "Batch write of {} records failed ({}), retrying one at a time",
                ids.len(),
                e
            );
            for record in records {
                let id = record.id.clone();
                let result = store.upsert(record).await;
                record_outcome(store, &id, result, verify, &mut summary).await;
            }
        }
    }
    summary
}

async fn record_outcome(
    store: &dyn VectorStore,
    id: &str,
    result: StorageResult<()>,
    verify: bool,
    summary: &mut PersistSummary,
) {
    match result {
        Ok(()) if !verify => summary.persisted += 1,
        Ok(()) => match store.get(id).await {
            Ok(Some(_)) => summary.persisted += 1,
            Ok(None) => {
                warn!("Record {} missing after write", id);
                summary.failed += 1;
            }
            Err(e) => {
                warn!("Failed to read back record {}: {}", id, e);
                summary.failed += 1;
            }
        },
        Err(e) => {
            warn!("Failed to store record {}: {}", id, e);
            summary.failed += 1;
        }
    }
}
