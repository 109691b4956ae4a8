use crate::SceneDetectionError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use video_search_common::SceneFrame;

/// Audit file written next to the sampled frames
pub const FRAME_METADATA_FILE: &str = "frame_metadata.csv";

#[derive(Debug, Serialize)]
struct FrameRow<'a> {
    scene: u32,
    frame_count: u32,
    frame_id: u64,
    timestamp_sec: f64,
    file_name: &'a str,
}

/// Write one CSV row per sampled frame into `out_dir`.
///
/// Returns `None` without touching the filesystem when there are no frames.
pub fn write_frame_metadata_csv(
    frames: &[SceneFrame],
    out_dir: &Path,
) -> Result<Option<PathBuf>, SceneDetectionError> {
    if frames.is_empty() {
        return Ok(None);
    }

    let path = out_dir.join(FRAME_METADATA_FILE);
    let mut writer = csv::Writer::from_path(&path)?;
    for frame in frames {
        let file_name = frame
            .image_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        writer.serialize(FrameRow {
            scene: frame.scene_index,
            frame_count: frame.frame_index_within_scene,
            frame_id: frame.frame_id,
            timestamp_sec: frame.timestamp_seconds,
            file_name,
        })?;
    }
    writer.flush()?;

    info!("Frame metadata saved to {}", path.display());
    Ok(Some(path))
}
