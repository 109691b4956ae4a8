//! Embedding extraction for transcript text and video frames
//!
//! Both modalities map into one shared vector space so that a text query can
//! retrieve frames and an image query can retrieve frames or speech. Every
//! vector leaving this crate is L2-normalized.
//!
//! The CLIP ONNX adapter is compiled with the `onnx` feature.

#[cfg(feature = "onnx")]
mod clip;
mod preprocess;

#[cfg(feature = "onnx")]
pub use clip::ClipEmbedder;
pub use preprocess::{load_image, preprocess_images, CLIP_MEAN, CLIP_STD};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Embedding dimension of CLIP ViT-B/32
pub const CLIP_VIT_B32_DIM: usize = 512;

/// Context length of the CLIP text transformer
pub const CLIP_CONTEXT_LENGTH: usize = 77;

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Path to the combined CLIP ONNX graph
    pub model_path: String,
    /// Path to the CLIP BPE `tokenizer.json`
    pub tokenizer_path: String,
    /// Items per inference call
    pub batch_size: usize,
    /// Square input resolution for the vision tower
    pub image_size: u32,
    /// Output vector size
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_path: "models/embeddings/clip_vit_b32.onnx".to_string(),
            tokenizer_path: "models/embeddings/tokenizer_clip/tokenizer.json".to_string(),
            batch_size: 32,
            image_size: 224,
            dimension: CLIP_VIT_B32_DIM,
        }
    }
}

/// Encodes text into the shared embedding space.
#[async_trait]
pub trait TextEncoder: Send + Sync {
    /// Embed every text, preserving order. Any failure fails the whole call.
    async fn embed_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;
}

/// Encodes images into the shared embedding space.
#[async_trait]
pub trait ImageEncoder: Send + Sync {
    /// Embed every image, preserving order.
    ///
    /// An image that cannot be read yields `None` in its slot; a model failure
    /// fails the whole call.
    async fn embed_images(&self, paths: &[PathBuf]) -> Result<Vec<Option<Vec<f32>>>>;

    fn dimension(&self) -> usize;
}

/// Euclidean length of a vector
#[must_use]
pub fn l2_norm(vec: &[f32]) -> f32 {
    vec.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale a vector to unit length in place. Near-zero vectors are left untouched.
pub fn normalize_vector(vec: &mut [f32]) {
    let norm = l2_norm(vec);
    if norm > 1e-12 {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}

/// Split `items` into batches of at most `batch_size` (a zero size is treated as 1)
pub fn chunked<T>(items: &[T], batch_size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(batch_size.max(1))
}
