//! CLIP ViT-B/32 through ONNX Runtime.
//!
//! The exported graph is the combined text+vision model, so every run must feed
//! `pixel_values`, `input_ids` and `attention_mask`. The unused tower gets a
//! single placeholder row; its output is ignored.

use crate::{
    chunked, load_image, normalize_vector, preprocess_images, EmbeddingConfig, ImageEncoder,
    TextEncoder, CLIP_CONTEXT_LENGTH,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ndarray::{Array2, Array4};
use ort::{session::Session, value::TensorRef};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

/// `<|startoftext|>`
const BOS_TOKEN: i64 = 49406;
/// `<|endoftext|>`, also used as padding
const EOS_TOKEN: i64 = 49407;

struct ClipInner {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    config: EmbeddingConfig,
}

/// [`TextEncoder`] and [`ImageEncoder`] sharing one CLIP session
#[derive(Clone)]
pub struct ClipEmbedder {
    inner: Arc<ClipInner>,
}

impl ClipEmbedder {
    /// Load the ONNX graph and tokenizer named in `config`
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        info!("Loading CLIP model from: {}", config.model_path);

        let session = Session::builder()
            .context("Failed to create session builder")?
            .commit_from_file(&config.model_path)
            .with_context(|| format!("Failed to load ONNX model from {}", config.model_path))?;

        info!("Loading tokenizer from: {}", config.tokenizer_path);
        let tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {e}"))?;

        Ok(Self {
            inner: Arc::new(ClipInner {
                session: Mutex::new(session),
                tokenizer,
                config,
            }),
        })
    }
}

impl ClipInner {
    /// Token ids and attention mask for a batch, padded or truncated to the context length
    fn tokenize(&self, texts: &[String]) -> Result<(Array2<i64>, Array2<i64>)> {
        let mut ids = Array2::<i64>::from_elem((texts.len(), CLIP_CONTEXT_LENGTH), EOS_TOKEN);
        let mut mask = Array2::<i64>::zeros((texts.len(), CLIP_CONTEXT_LENGTH));

        for (row, text) in texts.iter().enumerate() {
            let encoding = self
                .tokenizer
                .encode(text.as_str(), true)
                .map_err(|e| anyhow!("Tokenization failed: {e}"))?;
            let mut tokens: Vec<i64> = encoding.get_ids().iter().map(|&t| i64::from(t)).collect();
            if tokens.first() != Some(&BOS_TOKEN) {
                tokens.insert(0, BOS_TOKEN);
            }
            if tokens.last() != Some(&EOS_TOKEN) {
                tokens.push(EOS_TOKEN);
            }
            if tokens.len() > CLIP_CONTEXT_LENGTH {
                tokens.truncate(CLIP_CONTEXT_LENGTH);
                tokens[CLIP_CONTEXT_LENGTH - 1] = EOS_TOKEN;
            }
            for (col, token) in tokens.into_iter().enumerate() {
                ids[[row, col]] = token;
                mask[[row, col]] = 1;
            }
        }

        Ok((ids, mask))
    }

    fn run(
        &self,
        pixel_values: &Array4<f32>,
        input_ids: &Array2<i64>,
        attention_mask: &Array2<i64>,
        output: &str,
        rows: usize,
    ) -> Result<Vec<Vec<f32>>> {
        let pixel_values = TensorRef::from_array_view(pixel_values.view())
            .context("Failed to convert pixel_values to ort::TensorRef")?;
        let input_ids = TensorRef::from_array_view(input_ids.view())
            .context("Failed to convert input_ids to ort::TensorRef")?;
        let attention_mask = TensorRef::from_array_view(attention_mask.view())
            .context("Failed to convert attention_mask to ort::TensorRef")?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("CLIP session mutex poisoned"))?;
        let outputs = session
            .run(ort::inputs![
                "pixel_values" => pixel_values,
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
            ])
            .context("Failed to run ONNX inference")?;

        let (_shape, data) = outputs
            .get(output)
            .with_context(|| format!("Failed to get {output} from outputs"))?
            .try_extract_tensor::<f32>()
            .context("Failed to extract embeddings tensor")?;

        let dim = self.config.dimension;
        if data.len() < rows * dim {
            return Err(anyhow!(
                "{output} has {} values, expected {}x{}",
                data.len(),
                rows,
                dim
            ));
        }

        Ok((0..rows)
            .map(|i| {
                let mut embedding = data[i * dim..(i + 1) * dim].to_vec();
                normalize_vector(&mut embedding);
                embedding
            })
            .collect())
    }

    fn embed_text_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let size = self.config.image_size as usize;
        let placeholder_pixels = Array4::<f32>::zeros((1, 3, size, size));

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in chunked(texts, self.config.batch_size) {
            let (ids, mask) = self.tokenize(batch)?;
            embeddings.extend(self.run(&placeholder_pixels, &ids, &mask, "text_embeds", batch.len())?);
        }
        debug!("Extracted {} text embeddings", embeddings.len());
        Ok(embeddings)
    }

    fn embed_images_blocking(&self, paths: &[PathBuf]) -> Result<Vec<Option<Vec<f32>>>> {
        let (placeholder_ids, placeholder_mask) = self.tokenize(&[String::new()])?;

        let mut embeddings = Vec::with_capacity(paths.len());
        for batch in chunked(paths, self.config.batch_size) {
            let mut slots: Vec<Option<usize>> = Vec::with_capacity(batch.len());
            let mut images = Vec::with_capacity(batch.len());
            for path in batch {
                match load_image(path) {
                    Ok(img) => {
                        slots.push(Some(images.len()));
                        images.push(img);
                    }
                    Err(e) => {
                        warn!("Skipping unreadable frame: {:#}", e);
                        slots.push(None);
                    }
                }
            }

            let vectors = if images.is_empty() {
                Vec::new()
            } else {
                let pixels = preprocess_images(&images, self.config.image_size);
                self.run(
                    &pixels,
                    &placeholder_ids,
                    &placeholder_mask,
                    "image_embeds",
                    images.len(),
                )?
            };
            embeddings.extend(slots.into_iter().map(|slot| slot.map(|i| vectors[i].clone())));
        }
        debug!("Extracted {} vision embeddings", embeddings.len());
        Ok(embeddings)
    }
}

#[async_trait]
impl TextEncoder for ClipEmbedder {
    async fn embed_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inner = Arc::clone(&self.inner);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || inner.embed_text_blocking(&texts))
            .await
            .context("text embedding worker panicked")?
    }

    fn dimension(&self) -> usize {
        self.inner.config.dimension
    }
}

#[async_trait]
impl ImageEncoder for ClipEmbedder {
    async fn embed_images(&self, paths: &[PathBuf]) -> Result<Vec<Option<Vec<f32>>>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let inner = Arc::clone(&self.inner);
        let paths = paths.to_vec();
        tokio::task::spawn_blocking(move || inner.embed_images_blocking(&paths))
            .await
            .context("image embedding worker panicked")?
    }

    fn dimension(&self) -> usize {
        self.inner.config.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load() -> ClipEmbedder {
        let config = EmbeddingConfig {
            model_path: std::env::var("CLIP_MODEL").unwrap(),
            tokenizer_path: std::env::var("CLIP_TOKENIZER").unwrap(),
            ..EmbeddingConfig::default()
        };
        ClipEmbedder::new(config).unwrap()
    }

    #[test]
    fn test_missing_model_fails_to_load() {
        let config = EmbeddingConfig {
            model_path: "/nonexistent/clip.onnx".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(ClipEmbedder::new(config).is_err());
    }

    #[tokio::test]
    #[ignore = "requires CLIP_MODEL and CLIP_TOKENIZER"]
    async fn test_text_embeddings_are_normalized() {
        let clip = load();
        let texts = vec!["a photo of a cat".to_string(), "a red car".to_string()];
        let embeddings = clip.embed_text(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 2);
        for e in &embeddings {
            assert_eq!(e.len(), 512);
            assert!((crate::l2_norm(e) - 1.0).abs() < 1e-4);
        }
    }

    #[tokio::test]
    #[ignore = "requires CLIP_MODEL and CLIP_TOKENIZER"]
    async fn test_unreadable_image_is_isolated() {
        let clip = load();
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        image::RgbImage::from_pixel(64, 64, image::Rgb([200, 10, 10]))
            .save(&good)
            .unwrap();
        let bad = dir.path().join("bad.jpg");
        std::fs::write(&bad, b"not an image").unwrap();

        let embeddings = clip.embed_images(&[good, bad]).await.unwrap();
        assert!(embeddings[0].is_some());
        assert!(embeddings[1].is_none());
    }
}
