//! Scene segmentation using `FFmpeg`'s scdet filter
//!
//! Detection runs the scdet filter over the whole video and turns the reported
//! cut points into half-open scene intervals. Sampling then decodes frames at a
//! bounded rate inside every scene and writes them as JPEG files, together with
//! a `frame_metadata.csv` audit file.
//!
//! # Example
//! ```no_run
//! use video_search_scene::{FfmpegSceneSegmenter, SceneSegmenter};
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let segmenter = FfmpegSceneSegmenter::default();
//! let scenes = segmenter.segment(Path::new("video.mp4")).await?;
//! let frames = segmenter
//!     .sample(Path::new("video.mp4"), &scenes, Path::new("frames"))
//!     .await?;
//! println!("{} scenes, {} frames", scenes.len(), frames.len());
//! # Ok(())
//! # }
//! ```

mod report;
mod sampling;
mod segmenter;

pub use report::{write_frame_metadata_csv, FRAME_METADATA_FILE};
pub use sampling::{
    frame_file_name, plan_scene_frames, sample_frames, sampling_step, FfmpegFrameSource,
    FrameSource, SamplingConfig,
};
pub use segmenter::{FfmpegSceneSegmenter, SceneSegmenter};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};
use video_search_common::{ProcessingError, SceneInterval};

/// Errors specific to scene segmentation
#[derive(Error, Debug)]
pub enum SceneDetectionError {
    #[error("FFmpeg execution failed: {0}")]
    FfmpegError(String),

    #[error("Failed to parse scdet output: {0}")]
    ParseError(String),

    #[error("Video file not found: {0}")]
    FileNotFound(String),

    #[error("Video has no usable video stream: {0}")]
    NoVideoStream(String),

    #[error("Frame decode failed at frame {frame_id}: {message}")]
    DecodeError { frame_id: u64, message: String },

    #[error("Failed to write frame metadata: {0}")]
    ReportError(#[from] csv::Error),

    #[error("Probe failed: {0}")]
    ProbeError(#[from] ProcessingError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<SceneDetectionError> for ProcessingError {
    fn from(err: SceneDetectionError) -> Self {
        ProcessingError::Other(err.to_string())
    }
}

/// Configuration for cut detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDetectorConfig {
    /// Scene change detection threshold (0.0-100.0)
    /// Lower values = more sensitive (more scene changes detected)
    /// Default: 10.0 (`FFmpeg` default)
    pub threshold: f64,

    /// Minimum time between scene changes in seconds
    pub min_scene_duration: f64,

    /// Only decode keyframes (I-frames); much faster, less precise cut positions
    pub keyframes_only: bool,
}

impl Default for SceneDetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 10.0,
            min_scene_duration: 0.0,
            keyframes_only: false,
        }
    }
}

/// A detected scene boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneBoundary {
    /// Timestamp of the scene change in seconds
    pub timestamp: f64,

    /// Scene change score, compared against the configured threshold
    pub score: f64,
}

/// Raw result of a scdet pass
#[derive(Debug, Clone, Default)]
pub struct CutDetection {
    pub boundaries: Vec<SceneBoundary>,
    /// Container duration parsed from ffmpeg's banner, if present
    pub duration: Option<f64>,
}

impl CutDetection {
    #[must_use]
    pub fn cut_times(&self) -> Vec<f64> {
        self.boundaries.iter().map(|b| b.timestamp).collect()
    }
}

/// Run ffmpeg's scdet filter over `video_path` and collect cut points.
///
/// # Errors
///
/// Returns an error if the video file does not exist, `ffmpeg` is missing or
/// exits with a failure.
pub async fn detect_cuts(
    video_path: &Path,
    config: &SceneDetectorConfig,
) -> Result<CutDetection, SceneDetectionError> {
    if !video_path.exists() {
        return Err(SceneDetectionError::FileNotFound(
            video_path.display().to_string(),
        ));
    }
    which::which("ffmpeg").map_err(|_| {
        SceneDetectionError::FfmpegError("ffmpeg not found on PATH".to_string())
    })?;

    info!(
        "Running scene detection on {} with threshold {} (keyframes_only: {})",
        video_path.display(),
        config.threshold,
        config.keyframes_only
    );

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner").arg("-nostdin");
    if config.keyframes_only {
        cmd.arg("-skip_frame").arg("nokey");
    }

    // scdet logs every frame scoring above its own `t`; the configured threshold
    // is applied while parsing so the raw scores stay visible in debug logs
    let output = cmd
        .arg("-i")
        .arg(video_path)
        .arg("-vf")
        .arg(format!("scdet=t={}:s=1", config.threshold / 100.0))
        .arg("-an")
        .arg("-f")
        .arg("null")
        .arg("-")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| SceneDetectionError::FfmpegError(format!("Failed to execute ffmpeg: {e}")))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        let last = stderr.lines().last().unwrap_or("unknown error");
        return Err(SceneDetectionError::FfmpegError(last.to_string()));
    }

    let detection = parse_scdet_output(&stderr, config);
    info!(
        "Detected {} scene boundaries in {}",
        detection.boundaries.len(),
        video_path.display()
    );
    Ok(detection)
}

/// Parse ffmpeg stderr from a scdet run
#[must_use]
pub fn parse_scdet_output(stderr: &str, config: &SceneDetectorConfig) -> CutDetection {
    let mut boundaries: Vec<SceneBoundary> = Vec::new();
    let mut duration: Option<f64> = None;

    for line in stderr.lines() {
        if duration.is_none() && line.contains("Duration:") {
            if let Some(parsed) = parse_duration_line(line) {
                debug!("Parsed video duration: {:.2}s", parsed);
                duration = Some(parsed);
            }
        }

        if !(line.contains("lavfi.scd.score") && line.contains("lavfi.scd.time")) {
            continue;
        }
        let Some((score_str, time_str)) = parse_scdet_line(line) else {
            continue;
        };
        let (Ok(score), Ok(timestamp)) = (score_str.parse::<f64>(), time_str.parse::<f64>())
        else {
            warn!(
                "Failed to parse score or timestamp: {} | {}",
                score_str, time_str
            );
            continue;
        };

        if score < config.threshold {
            continue;
        }
        if config.min_scene_duration > 0.0 {
            if let Some(last) = boundaries.last() {
                if timestamp - last.timestamp < config.min_scene_duration {
                    debug!(
                        "Skipping scene at {:.2}s (too close to previous at {:.2}s)",
                        timestamp, last.timestamp
                    );
                    continue;
                }
            }
        }
        boundaries.push(SceneBoundary { timestamp, score });
    }

    CutDetection {
        boundaries,
        duration,
    }
}

/// Turn cut points into ordered, non-overlapping `[start, end)` intervals over `[0, duration)`.
///
/// Cuts outside `(0, duration)` are ignored, duplicates collapse, and zero-length
/// intervals are dropped. Scene indices are assigned after dropping, so they are
/// contiguous from zero.
#[must_use]
pub fn scenes_from_cuts(cuts: &[f64], duration: f64) -> Vec<SceneInterval> {
    if !(duration.is_finite() && duration > 0.0) {
        return Vec::new();
    }

    let mut points: Vec<f64> = cuts
        .iter()
        .copied()
        .filter(|t| t.is_finite() && *t > 0.0 && *t < duration)
        .collect();
    points.sort_by(f64::total_cmp);
    points.dedup();

    let mut edges = Vec::with_capacity(points.len() + 2);
    edges.push(0.0);
    edges.extend(points);
    edges.push(duration);

    edges
        .windows(2)
        .filter(|w| w[1] > w[0])
        .enumerate()
        .map(|(index, w)| SceneInterval {
            index: index as u32,
            start_seconds: w[0],
            end_seconds: w[1],
        })
        .collect()
}

/// Parse duration from `FFmpeg` output line
/// Format: Duration: HH:MM:SS.MS, start: ...
fn parse_duration_line(line: &str) -> Option<f64> {
    let duration_start = line.find("Duration: ")?;
    let duration_str_start = duration_start + "Duration: ".len();

    let duration_end = line[duration_str_start..].find(',')?;
    let duration_str = &line[duration_str_start..duration_str_start + duration_end];

    let parts: Vec<&str> = duration_str.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Parse a line from `FFmpeg` scdet output
/// Format: [scdet @ 0x...] lavfi.scd.score: 1.234, lavfi.scd.time: 5.678
fn parse_scdet_line(line: &str) -> Option<(&str, &str)> {
    let score_start = line.find("lavfi.scd.score: ")? + "lavfi.scd.score: ".len();
    let score_end = line[score_start..].find(',')?;
    let score_str = &line[score_start..score_start + score_end];

    let time_start = line.find("lavfi.scd.time: ")? + "lavfi.scd.time: ".len();
    let time_str = line[time_start..].split_whitespace().next()?;

    Some((score_str, time_str))
}
