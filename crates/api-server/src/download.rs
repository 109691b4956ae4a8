//! Query image download
//!
//! Image queries may name a remote image instead of carrying it inline. The
//! image is fetched into memory; the query orchestrator stages it on disk.

use anyhow::Context;
use reqwest::{Client as HttpClient, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// Largest query image accepted
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// Why a query image could not be obtained
#[derive(Debug, Error)]
pub enum ImageDownloadError {
    #[error("Invalid image URL: {0}")]
    InvalidUrl(String),

    #[error("Image URL returned status {0}")]
    UpstreamStatus(StatusCode),

    #[error("URL does not point to an image (content-type {0})")]
    NotAnImage(String),

    #[error("Image is empty")]
    Empty,

    #[error("Image too large: more than {MAX_IMAGE_BYTES} bytes")]
    TooLarge,

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl ImageDownloadError {
    /// True when the caller supplied a URL or image that can never succeed
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ImageDownloadError::Request(_))
    }
}

/// Download an image from an HTTP/HTTPS URL
///
/// The body is read chunk by chunk and abandoned as soon as it grows past
/// [`MAX_IMAGE_BYTES`], whether or not the server declared a length.
pub async fn download_image(url: &str) -> Result<Vec<u8>, ImageDownloadError> {
    info!("Downloading query image from URL: {}", url);

    let parsed = Url::parse(url).map_err(|e| ImageDownloadError::InvalidUrl(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ImageDownloadError::InvalidUrl(format!(
                "scheme '{scheme}' is not supported, use http or https"
            )))
        }
    }

    let client = HttpClient::builder()
        .timeout(Duration::from_secs(300))
        .build()?;

    let mut response = client.get(parsed).send().await?;

    if !response.status().is_success() {
        return Err(ImageDownloadError::UpstreamStatus(response.status()));
    }

    if let Some(content_type) = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
    {
        if !is_image_content_type(content_type) {
            return Err(ImageDownloadError::NotAnImage(content_type.to_string()));
        }
    }

    if let Some(size) = response.content_length() {
        debug!("Download size: {} bytes", size);
        if size > MAX_IMAGE_BYTES as u64 {
            return Err(ImageDownloadError::TooLarge);
        }
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if bytes.len() + chunk.len() > MAX_IMAGE_BYTES {
            return Err(ImageDownloadError::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }
    check_size(bytes.len())?;

    Ok(bytes)
}

/// Decode an inline base64 image
pub fn decode_inline_image(data: &str) -> anyhow::Result<Vec<u8>> {
    use base64::Engine as _;

    // Tolerate data URLs such as `data:image/png;base64,....`
    let payload = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .context("Image data is not valid base64")?;
    check_size(bytes.len())?;
    Ok(bytes)
}

fn check_size(len: usize) -> Result<(), ImageDownloadError> {
    if len == 0 {
        return Err(ImageDownloadError::Empty);
    }
    if len > MAX_IMAGE_BYTES {
        return Err(ImageDownloadError::TooLarge);
    }
    Ok(())
}

/// Whether a `Content-Type` header value may carry an image
fn is_image_content_type(content_type: &str) -> bool {
    let mime_type = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase();

    match mime_type.as_str() {
        // Servers often mislabel static files
        "application/octet-stream" | "binary/octet-stream" => true,
        other if other.starts_with("image/") => true,
        other => {
            warn!("Unexpected content-type for query image: {}", other);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_image_content_type() {
        assert!(is_image_content_type("image/jpeg"));
        assert!(is_image_content_type("image/png; charset=binary"));
        assert!(is_image_content_type("IMAGE/WEBP"));
        assert!(is_image_content_type("application/octet-stream"));
        assert!(!is_image_content_type("text/html; charset=utf-8"));
        assert!(!is_image_content_type("video/mp4"));
    }

    #[test]
    fn test_decode_inline_image() {
        assert_eq!(decode_inline_image("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(
            decode_inline_image("data:image/png;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert!(decode_inline_image("not base64!").is_err());
        assert!(decode_inline_image("").is_err());
    }

    /// Serve a single response on an ephemeral port and return its URL.
    ///
    /// No `Content-Length` is sent; the body ends when the connection closes.
    async fn serve_once(status_line: &'static str, body_len: usize) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/query.png", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let head = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: image/png\r\nConnection: close\r\n\r\n"
            );
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            let chunk = vec![0u8; 64 * 1024];
            let mut sent = 0;
            while sent < body_len {
                let n = chunk.len().min(body_len - sent);
                if socket.write_all(&chunk[..n]).await.is_err() {
                    return;
                }
                sent += n;
            }
            let _ = socket.shutdown().await;
        });
        url
    }

    #[tokio::test]
    async fn test_download_rejects_bad_urls() {
        for url in ["file:///etc/passwd", "not a url", "https://?x=1"] {
            let err = download_image(url).await.unwrap_err();
            assert!(matches!(err, ImageDownloadError::InvalidUrl(_)), "{url}: {err}");
            assert!(err.is_client_error());
        }
    }

    #[tokio::test]
    async fn test_download_stops_past_size_limit_without_length() {
        let url = serve_once("200 OK", MAX_IMAGE_BYTES + 256 * 1024).await;
        let err = download_image(&url).await.unwrap_err();
        assert!(matches!(err, ImageDownloadError::TooLarge), "{err}");
    }

    #[tokio::test]
    async fn test_download_small_image_without_length() {
        let url = serve_once("200 OK", 1024).await;
        assert_eq!(download_image(&url).await.unwrap().len(), 1024);
    }

    #[tokio::test]
    async fn test_download_reports_upstream_status() {
        let url = serve_once("404 Not Found", 0).await;
        let err = download_image(&url).await.unwrap_err();
        assert!(matches!(
            err,
            ImageDownloadError::UpstreamStatus(status) if status == StatusCode::NOT_FOUND
        ));
        assert!(err.is_client_error());
    }
}
