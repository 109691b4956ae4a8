//! Media acquisition: fetching a remote video into the working area and
//! probing the result.
//!
//! Two fetchers are provided. [`YtDlpFetcher`] handles hosting platforms through
//! the `yt-dlp` CLI and normalizes the container to MP4 (H.264/AAC, at most 480p).
//! [`HttpFetcher`] downloads direct media links and re-encodes them with ffmpeg
//! into the same profile. [`UrlRoutingFetcher`] picks between
//! them based on the URL path.

mod http;
mod probe;
mod ytdlp;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use video_search_common::{Result, Source};

pub use http::{is_direct_media_url, HttpFetcher, HttpFetcherConfig};
pub use probe::{parse_frame_rate, parse_probe_output, probe_media};
pub use ytdlp::{YtDlpConfig, YtDlpFetcher};

/// File name every fetcher writes the acquired video to
pub const VIDEO_FILE_NAME: &str = "video.mp4";

/// Fetches a remote video into a local directory.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download `source` into `dest_dir` and return the path of the local file.
    async fn fetch(&self, source: &Source, dest_dir: &Path) -> Result<PathBuf>;
}

/// Sends direct media links to [`HttpFetcher`] and everything else to [`YtDlpFetcher`].
pub struct UrlRoutingFetcher {
    platform: YtDlpFetcher,
    direct: HttpFetcher,
}

impl UrlRoutingFetcher {
    #[must_use]
    pub fn new(platform: YtDlpFetcher, direct: HttpFetcher) -> Self {
        Self { platform, direct }
    }
}

impl Default for UrlRoutingFetcher {
    fn default() -> Self {
        Self::new(YtDlpFetcher::default(), HttpFetcher::default())
    }
}

#[async_trait]
impl MediaFetcher for UrlRoutingFetcher {
    async fn fetch(&self, source: &Source, dest_dir: &Path) -> Result<PathBuf> {
        if is_direct_media_url(source) {
            self.direct.fetch(source, dest_dir).await
        } else {
            self.platform.fetch(source, dest_dir).await
        }
    }
}
