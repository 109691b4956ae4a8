//! `ffprobe` based media inspection.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};
use video_search_common::{MediaInfo, ProcessingError, Result, StreamInfo, StreamType};

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    bit_rate: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u8>,
}

/// Probe a media file for container, duration and stream information.
pub async fn probe_media(path: &Path) -> Result<MediaInfo> {
    debug!("Probing media file: {:?}", path);

    if !path.exists() {
        return Err(ProcessingError::CorruptedFile(format!(
            "media file does not exist: {}",
            path.display()
        )));
    }

    which::which("ffprobe").map_err(|_| ProcessingError::ToolNotFound("ffprobe".to_string()))?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(ProcessingError::FFmpegError(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let info = parse_probe_output(&output.stdout)?;
    info!(
        "Probed media: format={}, duration={:.2}s, streams={}",
        info.format,
        info.duration,
        info.streams.len()
    );
    Ok(info)
}

/// Parse the JSON document printed by `ffprobe -print_format json`.
pub fn parse_probe_output(json: &[u8]) -> Result<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(json)
        .map_err(|e| ProcessingError::CorruptedFile(format!("unreadable ffprobe output: {e}")))?;

    let streams = probe
        .streams
        .iter()
        .filter_map(|s| {
            let stream_type = match s.codec_type.as_deref()? {
                "video" => StreamType::Video,
                "audio" => StreamType::Audio,
                "subtitle" => StreamType::Subtitle,
                "data" => StreamType::Data,
                _ => return None,
            };
            let is_video = stream_type == StreamType::Video;
            Some(StreamInfo {
                stream_type,
                codec: s.codec_name.clone().unwrap_or_default(),
                bitrate: s
                    .bit_rate
                    .as_deref()
                    .and_then(|b| b.parse().ok())
                    .unwrap_or(0),
                width: s.width,
                height: s.height,
                fps: if is_video {
                    s.avg_frame_rate
                        .as_deref()
                        .and_then(parse_frame_rate)
                        .or_else(|| s.r_frame_rate.as_deref().and_then(parse_frame_rate))
                } else {
                    None
                },
                frame_count: s.nb_frames.as_deref().and_then(|n| n.parse().ok()),
                sample_rate: s.sample_rate.as_deref().and_then(|r| r.parse().ok()),
                channels: s.channels,
            })
        })
        .collect();

    Ok(MediaInfo {
        format: probe
            .format
            .format_name
            .unwrap_or_else(|| "unknown".to_string()),
        duration: probe
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse().ok())
            .unwrap_or(0.0),
        streams,
        metadata: probe.format.tags,
    })
}

/// Parse an ffprobe rate such as `30000/1001` or `25`. Zero rates yield `None`.
#[must_use]
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let value = if let Some((num, den)) = rate.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        rate.trim().parse().ok()?
    };
    (value.is_finite() && value > 0.0).then_some(value)
}
