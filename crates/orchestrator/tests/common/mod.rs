//! Fake collaborators for orchestrator tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use video_search_audio::AudioExtractor;
use video_search_common::{
    EmbeddingRecord, Modality, ProcessingError, SceneFrame, SceneInterval, Source,
    TranscriptSegment,
};
use video_search_embeddings::{ImageEncoder, TextEncoder};
use video_search_ingestion::{MediaFetcher, VIDEO_FILE_NAME};
use video_search_orchestrator::{
    Collaborators, IngestOptions, IngestStage, IngestionOrchestrator,
};
use video_search_scene::{
    sample_frames, scenes_from_cuts, FrameSource, SamplingConfig, SceneDetectionError,
    SceneSegmenter,
};
use video_search_storage::{
    LocalVectorStore, RecordFilter, ScoredRecord, StorageError, StorageResult, VectorStore,
};
use video_search_transcription::{Transcriber, TranscriptionError};

pub const DIM: usize = 8;

/// Stable bucket for a string
pub fn bucket(text: &str) -> usize {
    text.bytes().map(usize::from).sum::<usize>() % DIM
}

/// Deliberately unnormalized vector peaking at `axis`
pub fn peaked(axis: usize) -> Vec<f32> {
    let mut v = vec![0.25; DIM];
    v[axis % DIM] = 3.0;
    v
}

pub fn unit(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis % DIM] = 1.0;
    v
}

pub struct FakeFetcher {
    pub fail: bool,
    pub fetches: AtomicUsize,
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, _source: &Source, dest_dir: &Path) -> video_search_common::Result<PathBuf> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProcessingError::DownloadFailed("HTTP 404".into()));
        }
        let path = dest_dir.join(VIDEO_FILE_NAME);
        tokio::fs::write(&path, b"not really a video").await?;
        Ok(path)
    }
}

pub struct FakeAudio {
    pub fail: bool,
}

#[async_trait]
impl AudioExtractor for FakeAudio {
    async fn extract(&self, video: &Path, dest: &Path) -> video_search_common::Result<PathBuf> {
        assert!(video.exists(), "audio extraction ran before acquisition");
        if self.fail {
            return Err(ProcessingError::NoAudioStream);
        }
        let wav = dest.with_extension("wav");
        tokio::fs::write(&wav, b"RIFF").await?;
        Ok(wav)
    }
}

pub struct FakeTranscriber {
    pub segments: Vec<TranscriptSegment>,
    pub fail: bool,
    /// Sleep this long before answering
    pub delay: Option<Duration>,
    /// Every language hint received
    pub hints: Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(
        &self,
        wav: &Path,
        language_hint: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
        assert!(wav.exists(), "transcription ran before audio extraction");
        self.hints
            .lock()
            .unwrap()
            .push(language_hint.map(str::to_string));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(TranscriptionError::TranscriptionFailed("decoder crashed".into()));
        }
        Ok(self.segments.clone())
    }
}

/// Writes a small placeholder file for every requested frame
pub struct FileFrameSource;

#[async_trait]
impl FrameSource for FileFrameSource {
    async fn write_frame(
        &self,
        _video: &Path,
        frame_id: u64,
        _fps: f64,
        out_path: &Path,
    ) -> Result<(), SceneDetectionError> {
        tokio::fs::write(out_path, frame_id.to_string()).await?;
        Ok(())
    }
}

/// Cuts at fixed times, samples through the real frame planner
pub struct FakeSegmenter {
    pub cuts: Vec<f64>,
    pub duration: f64,
    pub fps: f64,
    pub fail: bool,
}

#[async_trait]
impl SceneSegmenter for FakeSegmenter {
    async fn segment(&self, video: &Path) -> Result<Vec<SceneInterval>, SceneDetectionError> {
        if self.fail {
            return Err(SceneDetectionError::FfmpegError(format!(
                "scdet failed on {}",
                video.display()
            )));
        }
        Ok(scenes_from_cuts(&self.cuts, self.duration))
    }

    async fn sample(
        &self,
        video: &Path,
        scenes: &[SceneInterval],
        out_dir: &Path,
    ) -> Result<Vec<SceneFrame>, SceneDetectionError> {
        sample_frames(
            &FileFrameSource,
            video,
            scenes,
            self.fps,
            &SamplingConfig::default(),
            out_dir,
        )
        .await
    }
}

pub struct FakeTextEncoder {
    pub fail: bool,
}

#[async_trait]
impl TextEncoder for FakeTextEncoder {
    async fn embed_text(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if self.fail {
            anyhow::bail!("text tower unavailable");
        }
        Ok(texts.iter().map(|t| peaked(bucket(t))).collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

/// Embeds by file name; names listed in `unreadable` yield `None`
pub struct FakeImageEncoder {
    pub fail: bool,
    pub unreadable: HashSet<String>,
}

#[async_trait]
impl ImageEncoder for FakeImageEncoder {
    async fn embed_images(&self, paths: &[PathBuf]) -> anyhow::Result<Vec<Option<Vec<f32>>>> {
        if self.fail {
            anyhow::bail!("vision tower unavailable");
        }
        Ok(paths
            .iter()
            .map(|p| {
                let name = p.file_name()?.to_string_lossy().to_string();
                if self.unreadable.contains(&name) || !p.exists() {
                    return None;
                }
                Some(peaked(bucket(&name)))
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

/// Store wrapper that rejects upserts of one modality
pub struct FlakyStore {
    pub inner: Arc<LocalVectorStore>,
    pub reject: Option<Modality>,
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn exists(&self, source: &Source) -> StorageResult<bool> {
        self.inner.exists(source).await
    }

    async fn upsert(&self, record: EmbeddingRecord) -> StorageResult<()> {
        if self.reject == Some(record.metadata.modality()) {
            return Err(StorageError::QdrantError("write rejected".into()));
        }
        self.inner.upsert(record).await
    }

    async fn get(&self, id: &str) -> StorageResult<Option<EmbeddingRecord>> {
        self.inner.get(id).await
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &RecordFilter,
    ) -> StorageResult<Vec<ScoredRecord>> {
        self.inner.query(vector, k, filter).await
    }

    async fn delete_source(&self, source: &Source) -> StorageResult<usize> {
        self.inner.delete_source(source).await
    }

    async fn is_complete(&self, source: &Source) -> StorageResult<bool> {
        self.inner.is_complete(source).await
    }

    async fn mark_complete(&self, source: &Source) -> StorageResult<()> {
        self.inner.mark_complete(source).await
    }

    async fn count(&self, filter: &RecordFilter) -> StorageResult<usize> {
        self.inner.count(filter).await
    }
}

/// Knobs for one test pipeline
#[derive(Clone)]
pub struct Scenario {
    pub fail_at: Option<IngestStage>,
    pub segments: Vec<TranscriptSegment>,
    pub cuts: Vec<f64>,
    pub duration: f64,
    pub fps: f64,
    pub unreadable_frames: Vec<String>,
    pub reject_writes: Option<Modality>,
    pub transcribe_delay: Option<Duration>,
}

impl Default for Scenario {
    /// Ten seconds of 30 fps video, one sentence, cuts at 3 s and 6 s
    fn default() -> Self {
        Self {
            fail_at: None,
            segments: vec![TranscriptSegment {
                start_offset_seconds: 1.2,
                end_offset_seconds: 4.8,
                text: "The quick brown fox jumps over the lazy dog.".to_string(),
            }],
            cuts: vec![3.0, 6.0],
            duration: 10.0,
            fps: 30.0,
            unreadable_frames: Vec::new(),
            reject_writes: None,
            transcribe_delay: None,
        }
    }
}

pub struct Harness {
    pub work_root: TempDir,
    pub store: Arc<LocalVectorStore>,
    pub fetcher: Arc<FakeFetcher>,
    pub transcriber: Arc<FakeTranscriber>,
    pub orchestrator: IngestionOrchestrator,
}

impl Harness {
    pub fn new(scenario: Scenario) -> Self {
        Self::with_store(scenario, Arc::new(LocalVectorStore::in_memory(DIM)), |o| o)
    }

    pub fn with_store(
        scenario: Scenario,
        store: Arc<LocalVectorStore>,
        tweak: impl FnOnce(IngestOptions) -> IngestOptions,
    ) -> Self {
        let work_root = tempfile::tempdir().unwrap();
        let fail = |stage| scenario.fail_at == Some(stage);

        let fetcher = Arc::new(FakeFetcher {
            fail: fail(IngestStage::Acquisition),
            fetches: AtomicUsize::new(0),
        });
        let transcriber = Arc::new(FakeTranscriber {
            segments: scenario.segments.clone(),
            fail: fail(IngestStage::Transcription),
            delay: scenario.transcribe_delay,
            hints: Mutex::new(Vec::new()),
        });
        let collaborators = Collaborators {
            fetcher: fetcher.clone(),
            audio: Arc::new(FakeAudio {
                fail: fail(IngestStage::AudioExtraction),
            }),
            transcriber: transcriber.clone(),
            segmenter: Arc::new(FakeSegmenter {
                cuts: scenario.cuts.clone(),
                duration: scenario.duration,
                fps: scenario.fps,
                fail: fail(IngestStage::Segmentation),
            }),
            text_encoder: Arc::new(FakeTextEncoder {
                fail: fail(IngestStage::TextIndexing),
            }),
            image_encoder: Arc::new(FakeImageEncoder {
                fail: fail(IngestStage::FrameIndexing),
                unreadable: scenario.unreadable_frames.iter().cloned().collect(),
            }),
            store: Arc::new(FlakyStore {
                inner: store.clone(),
                reject: scenario.reject_writes,
            }),
        };

        let options = tweak(IngestOptions {
            work_root: work_root.path().join("work"),
            ..IngestOptions::default()
        });

        Self {
            orchestrator: IngestionOrchestrator::new(collaborators, options),
            work_root,
            store,
            fetcher,
            transcriber,
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetcher.fetches.load(Ordering::SeqCst)
    }

    /// Language hints the transcriber was called with
    pub fn language_hints(&self) -> Vec<Option<String>> {
        self.transcriber.hints.lock().unwrap().clone()
    }

    /// Nothing left under the work root
    pub fn work_area_is_clean(&self) -> bool {
        let root = self.work_root.path().join("work");
        match std::fs::read_dir(&root) {
            Ok(mut entries) => entries.next().is_none(),
            Err(e) => e.kind() == std::io::ErrorKind::NotFound,
        }
    }

    /// Every stored record of `source` with `modality`
    pub async fn records(&self, source: &Source, modality: Modality) -> Vec<EmbeddingRecord> {
        let filter = RecordFilter::for_source(source).with_modality(modality);
        let hits = self.store.query(&unit(0), 1000, &filter).await.unwrap();
        let mut records = Vec::with_capacity(hits.len());
        for hit in hits {
            records.push(self.store.get(&hit.id).await.unwrap().unwrap());
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }
}
