//! Platform downloads through the `yt-dlp` CLI.

use crate::{MediaFetcher, VIDEO_FILE_NAME};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};
use video_search_common::{ProcessingError, Result, Source};

/// Output template stem; yt-dlp fills in the extension after merging.
const DOWNLOAD_STEM: &str = "temp_download";

/// yt-dlp invocation settings
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    /// Executable name or path
    pub binary: String,
    /// Format selector passed to `-f`
    pub format: String,
    /// Container the selected streams are merged into
    pub merge_output_format: String,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            format: "bestvideo[height<=480][vcodec^=avc1]+bestaudio[acodec^=mp4a]/best[height<=480][ext=mp4]"
                .to_string(),
            merge_output_format: "mp4".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct YtDlpFetcher {
    config: YtDlpConfig,
}

impl YtDlpFetcher {
    #[must_use]
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    /// Arguments for a single download into `dest_dir`
    fn build_args(&self, source: &Source, dest_dir: &Path) -> Vec<String> {
        let template = dest_dir.join(format!("{DOWNLOAD_STEM}.%(ext)s"));
        vec![
            "--quiet".to_string(),
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "-f".to_string(),
            self.config.format.clone(),
            "--merge-output-format".to_string(),
            self.config.merge_output_format.clone(),
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
            source.as_str().to_string(),
        ]
    }
}

/// Locate the file yt-dlp produced for the download stem
async fn find_download(dest_dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dest_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_candidate = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s == DOWNLOAD_STEM)
            && path.extension().is_some_and(|ext| ext != "part");
        if is_candidate {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, source: &Source, dest_dir: &Path) -> Result<PathBuf> {
        which::which(&self.config.binary)
            .map_err(|_| ProcessingError::ToolNotFound(self.config.binary.clone()))?;

        tokio::fs::create_dir_all(dest_dir).await?;
        info!("Downloading video from {} to {}", source, dest_dir.display());

        let output = Command::new(&self.config.binary)
            .args(self.build_args(source, dest_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp stderr: {}", stderr);
            let last_line = stderr.lines().last().unwrap_or("unknown error");
            return Err(ProcessingError::DownloadFailed(format!(
                "yt-dlp failed: {}",
                last_line
            )));
        }

        let downloaded = find_download(dest_dir).await?.ok_or_else(|| {
            ProcessingError::DownloadFailed("yt-dlp reported success but wrote no file".to_string())
        })?;

        let final_path = dest_dir.join(VIDEO_FILE_NAME);
        if downloaded != final_path {
            tokio::fs::rename(&downloaded, &final_path).await?;
        }

        let size = tokio::fs::metadata(&final_path).await?.len();
        info!(
            "Downloaded video: {} ({:.1} MB)",
            final_path.display(),
            size as f64 / (1024.0 * 1024.0)
        );
        Ok(final_path)
    }
}
