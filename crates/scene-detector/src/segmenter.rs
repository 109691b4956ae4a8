use crate::{
    detect_cuts, sample_frames, scenes_from_cuts, write_frame_metadata_csv, FfmpegFrameSource,
    FrameSource, SamplingConfig, SceneDetectionError, SceneDetectorConfig,
};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use video_search_common::{SceneFrame, SceneInterval};
use video_search_ingestion::probe_media;

/// Splits a video into scenes and samples representative frames from them.
#[async_trait]
pub trait SceneSegmenter: Send + Sync {
    /// Ordered, non-overlapping `[start, end)` scene intervals covering the video.
    async fn segment(&self, video: &Path) -> Result<Vec<SceneInterval>, SceneDetectionError>;

    /// Decode frames for `scenes` into `out_dir`, ordered by scene then frame.
    async fn sample(
        &self,
        video: &Path,
        scenes: &[SceneInterval],
        out_dir: &Path,
    ) -> Result<Vec<SceneFrame>, SceneDetectionError>;
}

/// [`SceneSegmenter`] built on ffprobe, the scdet filter and an ffmpeg frame source
pub struct FfmpegSceneSegmenter {
    detector: SceneDetectorConfig,
    sampling: SamplingConfig,
    frames: Arc<dyn FrameSource>,
}

impl FfmpegSceneSegmenter {
    #[must_use]
    pub fn new(detector: SceneDetectorConfig, sampling: SamplingConfig) -> Self {
        let frames = Arc::new(FfmpegFrameSource::new(sampling.jpeg_quality));
        Self::with_frame_source(detector, sampling, frames)
    }

    #[must_use]
    pub fn with_frame_source(
        detector: SceneDetectorConfig,
        sampling: SamplingConfig,
        frames: Arc<dyn FrameSource>,
    ) -> Self {
        Self {
            detector,
            sampling,
            frames,
        }
    }
}

impl Default for FfmpegSceneSegmenter {
    fn default() -> Self {
        Self::new(SceneDetectorConfig::default(), SamplingConfig::default())
    }
}

#[async_trait]
impl SceneSegmenter for FfmpegSceneSegmenter {
    async fn segment(&self, video: &Path) -> Result<Vec<SceneInterval>, SceneDetectionError> {
        let info = probe_media(video).await?;
        if !info.has_video() {
            return Err(SceneDetectionError::NoVideoStream(
                video.display().to_string(),
            ));
        }

        let detection = detect_cuts(video, &self.detector).await?;
        let duration = if info.duration > 0.0 {
            info.duration
        } else {
            detection.duration.unwrap_or(0.0)
        };
        if duration <= 0.0 {
            return Err(SceneDetectionError::ParseError(format!(
                "could not determine duration of {}",
                video.display()
            )));
        }

        let scenes = scenes_from_cuts(&detection.cut_times(), duration);
        info!("Segmented {} into {} scenes", video.display(), scenes.len());
        Ok(scenes)
    }

    async fn sample(
        &self,
        video: &Path,
        scenes: &[SceneInterval],
        out_dir: &Path,
    ) -> Result<Vec<SceneFrame>, SceneDetectionError> {
        let info = probe_media(video).await?;
        let fps = info
            .fps()
            .ok_or_else(|| SceneDetectionError::NoVideoStream(video.display().to_string()))?;

        let frames =
            sample_frames(self.frames.as_ref(), video, scenes, fps, &self.sampling, out_dir).await?;

        // The CSV is an audit artifact; failing to write it never fails sampling
        if let Err(e) = write_frame_metadata_csv(&frames, out_dir) {
            warn!("Failed to write frame metadata: {}", e);
        }

        info!("Sampled {} frames from {} scenes", frames.len(), scenes.len());
        Ok(frames)
    }
}
