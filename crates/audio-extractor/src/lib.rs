/// Audio extraction module
///
/// Transcodes an acquired video into the canonical waveform the transcriber
/// consumes: uncompressed 16-bit PCM WAV, mono, 16 kHz by default.
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};
use video_search_common::{ProcessingError, Result};

/// Audio extraction configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Target sample rate (16000 for speech models)
    pub sample_rate: u32,
    /// Number of channels (1 for mono)
    pub channels: u8,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
        }
    }
}

/// Transcodes a media file into a WAV waveform.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Extract the audio track of `video` into `dest` and return the written path.
    async fn extract(&self, video: &Path, dest: &Path) -> Result<PathBuf>;
}

/// [`AudioExtractor`] backed by the `ffmpeg` CLI
#[derive(Debug, Clone, Default)]
pub struct FfmpegAudioExtractor {
    config: AudioConfig,
}

impl FfmpegAudioExtractor {
    #[must_use]
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &AudioConfig {
        &self.config
    }
}

/// Build the ffmpeg argument list for a PCM extraction
fn ffmpeg_args(input_path: &Path, output_path: &Path, config: &AudioConfig) -> Vec<OsString> {
    vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-i".into(),
        input_path.as_os_str().to_owned(),
        "-vn".into(),
        "-acodec".into(),
        "pcm_s16le".into(),
        "-ar".into(),
        config.sample_rate.to_string().into(),
        "-ac".into(),
        config.channels.to_string().into(),
        "-y".into(),
        output_path.as_os_str().to_owned(),
    ]
}

/// Map ffmpeg's stderr for a failed run to the closest error kind
fn classify_failure(stderr: &str) -> ProcessingError {
    if stderr.contains("does not contain any stream")
        || stderr.contains("Output file #0 does not contain any stream")
        || stderr.contains("matches no streams")
    {
        return ProcessingError::NoAudioStream;
    }
    let tail: Vec<&str> = stderr.lines().rev().take(3).collect();
    ProcessingError::FFmpegError(format!(
        "FFmpeg failed: {}",
        tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
    ))
}

#[async_trait]
impl AudioExtractor for FfmpegAudioExtractor {
    async fn extract(&self, video: &Path, dest: &Path) -> Result<PathBuf> {
        if !video.exists() {
            return Err(ProcessingError::CorruptedFile(format!(
                "input file not found: {}",
                video.display()
            )));
        }
        which::which("ffmpeg").map_err(|_| ProcessingError::ToolNotFound("ffmpeg".to_string()))?;

        let output_path = dest.with_extension("wav");
        debug!(
            "Extracting audio {} -> {} ({} Hz, {} ch)",
            video.display(),
            output_path.display(),
            self.config.sample_rate,
            self.config.channels
        );

        let output = Command::new("ffmpeg")
            .args(ffmpeg_args(video, &output_path, &self.config))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ProcessingError::FFmpegError(format!("Failed to execute FFmpeg: {e}")))?;

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        // Verify output file exists
        if !output_path.exists() {
            return Err(ProcessingError::FFmpegError(
                "Output file was not created".to_string(),
            ));
        }

        info!("Extracted audio to {}", output_path.display());
        Ok(output_path)
    }
}
