//! Direct downloads of media files over HTTP(S).
//!
//! The downloaded file is re-encoded with ffmpeg into the same profile the
//! platform fetcher produces: MP4 with H.264 video capped at 480 lines and AAC audio.

use crate::{MediaFetcher, VIDEO_FILE_NAME};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};
use video_search_common::{ProcessingError, Result, Source};

/// Extensions treated as direct links to a video file
const DIRECT_MEDIA_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "webm", "mkv"];

/// Stem of the raw download before normalization
const RAW_STEM: &str = "temp_download";

/// True when the URL path ends in a known video file extension.
#[must_use]
pub fn is_direct_media_url(source: &Source) -> bool {
    let path = source.path();
    path.rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .is_some_and(|(_, ext)| DIRECT_MEDIA_EXTENSIONS.contains(&ext))
}

#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    pub timeout: Duration,
    /// Responses larger than this are rejected
    pub max_bytes: u64,
    /// ffmpeg executable used to normalize the download
    pub ffmpeg_binary: String,
    /// Output frames are scaled down to at most this height
    pub max_height: u32,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            max_bytes: 2 * 1024 * 1024 * 1024,
            ffmpeg_binary: "ffmpeg".to_string(),
            max_height: 480,
        }
    }
}

/// ffmpeg arguments re-encoding `input` into the canonical MP4 profile
fn normalize_args(input: &Path, output: &Path, max_height: u32) -> Vec<OsString> {
    vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-i".into(),
        input.as_os_str().to_owned(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "0:a:0?".into(),
        "-vf".into(),
        format!("scale=-2:'min({max_height},ih)'").into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "veryfast".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-c:a".into(),
        "aac".into(),
        "-movflags".into(),
        "+faststart".into(),
        "-y".into(),
        output.as_os_str().to_owned(),
    ]
}

/// Name of the raw download, keeping the extension of the URL path
fn raw_file_name(source: &Source) -> String {
    let path = source.path();
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map_or("bin", |(_, ext)| ext);
    format!("{RAW_STEM}.{ext}")
}

#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    config: HttpFetcherConfig,
}

impl HttpFetcher {
    #[must_use]
    pub fn new(config: HttpFetcherConfig) -> Self {
        Self { config }
    }

    /// Re-encode the raw download into `dest_dir/video.mp4`
    async fn normalize(&self, raw: &Path, dest_dir: &Path) -> Result<PathBuf> {
        let output_path = dest_dir.join(VIDEO_FILE_NAME);
        debug!("Normalizing {} -> {}", raw.display(), output_path.display());

        let output = Command::new(&self.config.ffmpeg_binary)
            .args(normalize_args(raw, &output_path, self.config.max_height))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ProcessingError::FFmpegError(format!("Failed to execute FFmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("ffmpeg stderr: {}", stderr);
            if stderr.contains("matches no streams") {
                return Err(ProcessingError::NoVideoStream);
            }
            let last_line = stderr.lines().last().unwrap_or("unknown error");
            return Err(ProcessingError::CorruptedFile(format!(
                "could not normalize download: {}",
                last_line
            )));
        }
        if !output_path.exists() {
            return Err(ProcessingError::FFmpegError(
                "Output file was not created".to_string(),
            ));
        }

        tokio::fs::remove_file(raw).await?;
        Ok(output_path)
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, source: &Source, dest_dir: &Path) -> Result<PathBuf> {
        which::which(&self.config.ffmpeg_binary)
            .map_err(|_| ProcessingError::ToolNotFound(self.config.ffmpeg_binary.clone()))?;
        info!("Downloading file from URL: {}", source);

        let client = HttpClient::builder()
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| ProcessingError::DownloadFailed(format!("HTTP client: {e}")))?;

        let mut response = client
            .get(source.as_str())
            .send()
            .await
            .map_err(|e| ProcessingError::DownloadFailed(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ProcessingError::DownloadFailed(format!(
                "HTTP request failed with status: {}",
                response.status()
            )));
        }
        if let Some(size) = response.content_length() {
            debug!("Download size: {} bytes", size);
            if size > self.config.max_bytes {
                return Err(ProcessingError::DownloadFailed(format!(
                    "response of {} bytes exceeds limit of {}",
                    size, self.config.max_bytes
                )));
            }
        }

        tokio::fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join(raw_file_name(source));
        let mut file = File::create(&path).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ProcessingError::DownloadFailed(format!("reading body: {e}")))?
        {
            written += chunk.len() as u64;
            if written > self.config.max_bytes {
                return Err(ProcessingError::DownloadFailed(format!(
                    "download exceeded limit of {} bytes",
                    self.config.max_bytes
                )));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        if written == 0 {
            return Err(ProcessingError::DownloadFailed(
                "server returned an empty body".to_string(),
            ));
        }

        info!("Successfully downloaded {} bytes to {}", written, path.display());
        self.normalize(&path, dest_dir).await
    }
}
