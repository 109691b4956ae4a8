//! Whisper.cpp backend.

use crate::{
    language_code, load_wav_samples, normalize_segments, Result, Transcriber,
    TranscriptionConfig, TranscriptionError,
};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;
use video_search_common::TranscriptSegment;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// [`Transcriber`] running a ggml Whisper model in-process.
///
/// whisper.cpp contexts are not safe to drive from several threads at once even
/// though the bindings mark them `Sync`, so access is serialized with a mutex.
pub struct WhisperTranscriber {
    context: Arc<Mutex<WhisperContext>>,
    config: TranscriptionConfig,
}

impl WhisperTranscriber {
    /// Load a Whisper model from a ggml file
    pub fn new(model_path: impl AsRef<Path>, config: TranscriptionConfig) -> Result<Self> {
        config.validate()?;

        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(TranscriptionError::ModelLoadError(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        info!("Loading Whisper model from {}", model_path.display());

        let context = WhisperContext::new_with_params(
            model_path.to_str().ok_or_else(|| {
                TranscriptionError::ModelLoadError("Invalid path encoding".to_string())
            })?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| TranscriptionError::ModelLoadError(e.to_string()))?;

        Ok(Self {
            context: Arc::new(Mutex::new(context)),
            config,
        })
    }

    fn create_params<'a>(config: &TranscriptionConfig, language: Option<&'a str>) -> FullParams<'a, 'a> {
        let strategy = if config.beam_size > 1 {
            SamplingStrategy::BeamSearch {
                beam_size: i32::from(config.beam_size),
                patience: 1.0,
            }
        } else {
            SamplingStrategy::Greedy { best_of: 1 }
        };

        let mut params = FullParams::new(strategy);
        params.set_n_threads(config.num_threads as i32);
        params.set_language(language);
        params.set_translate(config.translate);
        params.set_token_timestamps(false);
        params.set_temperature(config.temperature);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_special(false);
        params.set_print_timestamps(false);
        params
    }

    fn run_blocking(
        context: &Mutex<WhisperContext>,
        config: &TranscriptionConfig,
        wav: &Path,
        language: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>> {
        let samples = load_wav_samples(wav)?;
        let params = Self::create_params(config, language);

        let context = context
            .lock()
            .map_err(|_| TranscriptionError::ContextError("Whisper context poisoned".to_string()))?;
        let mut state = context
            .create_state()
            .map_err(|e| TranscriptionError::ContextError(e.to_string()))?;

        state
            .full(params, &samples)
            .map_err(|e| TranscriptionError::TranscriptionFailed(e.to_string()))?;

        // Segment timestamps are reported in centiseconds
        let raw = state
            .as_iter()
            .map(|segment| TranscriptSegment {
                start_offset_seconds: segment.start_timestamp() as f64 / 100.0,
                end_offset_seconds: segment.end_timestamp() as f64 / 100.0,
                text: segment.to_string(),
            })
            .collect();

        Ok(normalize_segments(raw))
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(
        &self,
        wav: &Path,
        language_hint: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>> {
        let context = Arc::clone(&self.context);
        let config = self.config.clone();
        let wav = wav.to_path_buf();
        let language = language_code(language_hint).map(str::to_string);

        info!("Starting transcription of {}", wav.display());
        let segments = tokio::task::spawn_blocking(move || {
            Self::run_blocking(&context, &config, &wav, language.as_deref())
        })
        .await
        .map_err(|e| TranscriptionError::TranscriptionFailed(format!("worker panicked: {e}")))??;

        info!("Transcription complete: {} segments", segments.len());
        Ok(segments)
    }
}
