//! Transcription module
//!
//! Converts a 16 kHz mono waveform into ordered, timestamped text segments.
//! The Whisper.cpp backend lives behind the `whisper` feature; everything else
//! (configuration, WAV loading, segment normalization) is backend independent.

#[cfg(feature = "whisper")]
mod whisper;

#[cfg(feature = "whisper")]
pub use whisper::WhisperTranscriber;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use video_search_common::{ProcessingError, TranscriptSegment};

/// Sample rate every backend expects
pub const SAMPLE_RATE: u32 = 16000;

/// Transcription errors
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("Failed to load model: {0}")]
    ModelLoadError(String),

    #[error("Failed to create transcription context: {0}")]
    ContextError(String),

    #[error("Failed to load audio: {0}")]
    AudioLoadError(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Processing error: {0}")]
    ProcessingError(#[from] ProcessingError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for transcription operations
pub type Result<T> = std::result::Result<T, TranscriptionError>;

/// Transcription configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Beam search size, 1 selects greedy decoding
    pub beam_size: u8,

    /// Temperature for sampling (0.0-1.0)
    pub temperature: f32,

    /// Number of threads for CPU inference
    pub num_threads: usize,

    /// Enable translation to English
    pub translate: bool,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            beam_size: 1,
            temperature: 0.0,
            num_threads: num_cpus::get().clamp(1, 8),
            translate: false,
        }
    }
}

impl TranscriptionConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.beam_size == 0 || self.beam_size > 10 {
            return Err(TranscriptionError::InvalidConfig(
                "beam_size must be between 1 and 10".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(TranscriptionError::InvalidConfig(
                "temperature must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.num_threads == 0 {
            return Err(TranscriptionError::InvalidConfig(
                "num_threads must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Language code to decode with; a missing or blank hint means auto-detection
#[must_use]
pub fn language_code(hint: Option<&str>) -> Option<&str> {
    hint.map(str::trim).filter(|h| !h.is_empty())
}

/// Speech-to-text backend.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a 16 kHz mono WAV file into ordered segments.
    ///
    /// `language_hint` is the only language setting; `None` lets the backend detect it.
    /// Returned segments have trimmed, non-empty text and non-decreasing start offsets.
    async fn transcribe(
        &self,
        wav: &Path,
        language_hint: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>>;
}

/// Clean up raw backend output.
///
/// Text is trimmed, empty segments are dropped, an end offset before its start is
/// clamped to the start, and the result is stably ordered by start offset.
#[must_use]
pub fn normalize_segments(raw: Vec<TranscriptSegment>) -> Vec<TranscriptSegment> {
    let mut segments: Vec<TranscriptSegment> = raw
        .into_iter()
        .filter_map(|segment| {
            let text = segment.text.trim();
            if text.is_empty() {
                return None;
            }
            let start = segment.start_offset_seconds.max(0.0);
            Some(TranscriptSegment {
                start_offset_seconds: start,
                end_offset_seconds: segment.end_offset_seconds.max(start),
                text: text.to_string(),
            })
        })
        .collect();

    segments.sort_by(|a, b| a.start_offset_seconds.total_cmp(&b.start_offset_seconds));
    segments
}

/// Read a 16 kHz mono WAV file into f32 samples in `[-1.0, 1.0]`.
pub fn load_wav_samples(wav_path: &Path) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(wav_path)
        .map_err(|e| TranscriptionError::AudioLoadError(format!("Failed to open WAV file: {e}")))?;

    let spec = reader.spec();

    if spec.sample_rate != SAMPLE_RATE {
        return Err(TranscriptionError::AudioLoadError(format!(
            "Expected {}Hz sample rate, got {}Hz",
            SAMPLE_RATE, spec.sample_rate
        )));
    }
    if spec.channels != 1 {
        return Err(TranscriptionError::AudioLoadError(format!(
            "Expected mono audio, got {} channels",
            spec.channels
        )));
    }

    let num_samples = reader.len() as usize;
    let mut samples = Vec::with_capacity(num_samples);
    match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            for sample in reader.samples::<i32>() {
                let sample = sample.map_err(|e| {
                    TranscriptionError::AudioLoadError(format!("Failed to read sample: {e}"))
                })?;
                samples.push(sample as f32 / max_val);
            }
        }
        hound::SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                let sample = sample.map_err(|e| {
                    TranscriptionError::AudioLoadError(format!("Failed to read sample: {e}"))
                })?;
                samples.push(sample);
            }
        }
    }

    debug!(
        "Loaded {} samples ({:.2}s) from {}",
        samples.len(),
        samples.len() as f64 / f64::from(SAMPLE_RATE),
        wav_path.display()
    );

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start_offset_seconds: start,
            end_offset_seconds: end,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_config_defaults_are_greedy() {
        let config = TranscriptionConfig::default();
        assert_eq!(config.beam_size, 1);
        assert_eq!(config.temperature, 0.0);
        assert!(config.num_threads >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = TranscriptionConfig::default();

        config.beam_size = 0;
        assert!(config.validate().is_err());

        config.beam_size = 11;
        assert!(config.validate().is_err());

        config.beam_size = 5;
        config.temperature = 1.5;
        assert!(config.validate().is_err());

        config.temperature = 0.5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_language_code_has_no_fallback() {
        assert_eq!(language_code(None), None);
        assert_eq!(language_code(Some("")), None);
        assert_eq!(language_code(Some("  ")), None);
        assert_eq!(language_code(Some(" de ")), Some("de"));
    }

    #[test]
    fn test_normalize_segments() {
        let raw = vec![
            segment(4.0, 6.0, "  second sentence. "),
            segment(0.0, 2.5, "First sentence."),
            segment(2.5, 3.0, "   "),
            segment(7.0, 6.5, "clamped"),
        ];

        let segments = normalize_segments(raw);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].text, "First sentence.");
        assert_eq!(segments[1].text, "second sentence.");
        assert_eq!(segments[2].end_offset_seconds, 7.0);

        for pair in segments.windows(2) {
            assert!(pair[0].start_offset_seconds <= pair[1].start_offset_seconds);
        }
    }

    #[test]
    fn test_normalize_segments_empty() {
        assert!(normalize_segments(Vec::new()).is_empty());
    }
}
