//! Per-scene frame sampling.

use crate::SceneDetectionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};
use video_search_common::{SceneFrame, SceneInterval};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Frames sampled per second of video within a scene
    pub target_fps: f64,
    /// JPEG quality passed to ffmpeg's `-q:v` (2 = best, 31 = worst)
    pub jpeg_quality: u8,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            target_fps: 0.5,
            jpeg_quality: 2,
        }
    }
}

/// Decodes single frames of a video to image files.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Decode absolute frame `frame_id` of `video` and write it to `out_path`.
    async fn write_frame(
        &self,
        video: &Path,
        frame_id: u64,
        fps: f64,
        out_path: &Path,
    ) -> Result<(), SceneDetectionError>;
}

/// [`FrameSource`] that seeks with ffmpeg and writes one JPEG per call
#[derive(Debug, Clone)]
pub struct FfmpegFrameSource {
    jpeg_quality: u8,
}

impl FfmpegFrameSource {
    #[must_use]
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(2, 31),
        }
    }
}

impl Default for FfmpegFrameSource {
    fn default() -> Self {
        Self::new(SamplingConfig::default().jpeg_quality)
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn write_frame(
        &self,
        video: &Path,
        frame_id: u64,
        fps: f64,
        out_path: &Path,
    ) -> Result<(), SceneDetectionError> {
        let seek = frame_id as f64 / fps;
        let output = Command::new("ffmpeg")
            .arg("-hide_banner")
            .arg("-nostdin")
            .arg("-loglevel")
            .arg("error")
            .arg("-ss")
            .arg(format!("{seek:.6}"))
            .arg("-i")
            .arg(video)
            .arg("-frames:v")
            .arg("1")
            .arg("-q:v")
            .arg(self.jpeg_quality.to_string())
            .arg("-y")
            .arg(out_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(SceneDetectionError::DecodeError {
                frame_id,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        // Seeking past the last frame exits cleanly without writing anything
        if !out_path.exists() {
            return Err(SceneDetectionError::DecodeError {
                frame_id,
                message: "no frame decoded at position".to_string(),
            });
        }
        Ok(())
    }
}

/// `max(1, round(source_fps / target_fps))`
#[must_use]
pub fn sampling_step(source_fps: f64, target_fps: f64) -> u64 {
    if !(source_fps.is_finite() && target_fps.is_finite()) || target_fps <= 0.0 {
        return 1;
    }
    ((source_fps / target_fps).round() as u64).max(1)
}

/// Frame positions to decode for one scene.
///
/// Starts at `floor(start * fps)` and advances by `step` while below
/// `floor(end * fps)`. A scene shorter than one frame still yields its first frame.
#[must_use]
pub fn plan_scene_frames(scene: &SceneInterval, fps: f64, step: u64) -> Vec<u64> {
    if scene.duration() <= 0.0 {
        return Vec::new();
    }
    let start_frame = (scene.start_seconds * fps).floor() as u64;
    let end_frame = (scene.end_seconds * fps).floor() as u64;
    let step = step.max(1);

    let mut frames: Vec<u64> = (start_frame..end_frame).step_by(step as usize).collect();
    if frames.is_empty() {
        frames.push(start_frame);
    }
    frames
}

/// `scene_{i:03}_frame_{n:04}.jpg`
#[must_use]
pub fn frame_file_name(scene_index: u32, frame_index: u32) -> String {
    format!("scene_{scene_index:03}_frame_{frame_index:04}.jpg")
}

fn round_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

/// Decode the planned frames of every scene into `out_dir`.
///
/// A decode failure ends that scene early with a warning; other scenes still run.
pub async fn sample_frames(
    source: &dyn FrameSource,
    video: &Path,
    scenes: &[SceneInterval],
    fps: f64,
    config: &SamplingConfig,
    out_dir: &Path,
) -> Result<Vec<SceneFrame>, SceneDetectionError> {
    if !(fps.is_finite() && fps > 0.0) {
        return Err(SceneDetectionError::NoVideoStream(format!(
            "invalid frame rate {fps} for {}",
            video.display()
        )));
    }
    tokio::fs::create_dir_all(out_dir).await?;

    let step = sampling_step(fps, config.target_fps);
    debug!("Sampling {} scenes at step {} (fps={:.3})", scenes.len(), step, fps);

    let mut frames = Vec::new();
    for scene in scenes {
        for (frame_index, frame_id) in plan_scene_frames(scene, fps, step).into_iter().enumerate() {
            let frame_index = frame_index as u32;
            let image_path: PathBuf = out_dir.join(frame_file_name(scene.index, frame_index));

            if let Err(e) = source.write_frame(video, frame_id, fps, &image_path).await {
                warn!(
                    "Stopping scene {} early after {} frames: {}",
                    scene.index, frame_index, e
                );
                break;
            }

            frames.push(SceneFrame {
                scene_index: scene.index,
                frame_index_within_scene: frame_index,
                frame_id,
                timestamp_seconds: round_millis(frame_id as f64 / fps),
                image_path,
            });
        }
    }

    Ok(frames)
}
