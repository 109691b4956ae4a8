//! Vector store gateway
//!
//! Persists `(id, vector, metadata)` records keyed by source video and answers
//! filtered nearest-neighbour queries over them. Two backends implement
//! [`VectorStore`]:
//! - [`LocalVectorStore`]: in-memory index with an atomically replaced JSON snapshot
//! - [`QdrantVectorStore`]: a Qdrant collection (cosine distance, HNSW)
//!
//! Besides records the store keeps a per-source completion marker, written
//! only after every stage of an ingestion has succeeded.
//!
//! # Example
//!
//! ```rust,no_run
//! use video_search_common::{Modality, Source};
//! use video_search_storage::{LocalVectorStore, RecordFilter, VectorStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = LocalVectorStore::open("store_emb/index.json", 512).await?;
//!     let source = Source::parse("https://www.youtube.com/watch?v=abc")?;
//!
//!     let filter = RecordFilter::default()
//!         .with_modality(Modality::Text)
//!         .with_source(source);
//!     let hits = store.query(&vec![0.0; 512], 5, &filter).await?;
//!     println!("{} hits", hits.len());
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use video_search_common::{EmbeddingRecord, Modality, RecordMetadata, Source};

mod local;
mod qdrant;

pub use local::LocalVectorStore;
pub use qdrant::{QdrantConfig, QdrantVectorStore};

/// Storage layer errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Qdrant error: {0}")]
    QdrantError(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Conjunction of optional predicates on record metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub modality: Option<Modality>,
    pub source: Option<Source>,
}

impl RecordFilter {
    #[must_use]
    pub fn with_modality(mut self, modality: Modality) -> Self {
        self.modality = Some(modality);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn for_source(source: &Source) -> Self {
        Self::default().with_source(source.clone())
    }

    /// True when every set predicate holds for `metadata`
    #[must_use]
    pub fn matches(&self, metadata: &RecordMetadata) -> bool {
        self.modality.map_or(true, |m| metadata.modality() == m)
            && self.source.as_ref().map_or(true, |s| &metadata.source == s)
    }
}

/// Which records a search draws its results from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputScope {
    /// Transcript records of the requested source
    Text,
    /// Frame records of the requested source
    Image,
    /// Transcript records of every ingested source
    Both,
}

impl OutputScope {
    /// Build the store filter for this scope.
    ///
    /// `Both` is the global mode: it matches text records across all sources and
    /// ignores `source`.
    #[must_use]
    pub fn filter(self, source: &Source) -> RecordFilter {
        match self {
            OutputScope::Text => RecordFilter::default()
                .with_modality(Modality::Text)
                .with_source(source.clone()),
            OutputScope::Image => RecordFilter::default()
                .with_modality(Modality::Image)
                .with_source(source.clone()),
            OutputScope::Both => RecordFilter::default().with_modality(Modality::Text),
        }
    }

    /// Whether results are restricted to the requested source
    #[must_use]
    pub fn is_source_scoped(self) -> bool {
        !matches!(self, OutputScope::Both)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OutputScope::Text => "text",
            OutputScope::Image => "image",
            OutputScope::Both => "both",
        }
    }
}

impl fmt::Display for OutputScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(OutputScope::Text),
            "image" => Ok(OutputScope::Image),
            "both" => Ok(OutputScope::Both),
            other => Err(format!(
                "invalid output_from '{other}' (expected text, image or both)"
            )),
        }
    }
}

/// A query hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: String,
    pub metadata: RecordMetadata,
    /// `1 - cosine similarity`; smaller is closer
    pub distance: f32,
}

/// Record persistence and filtered nearest-neighbour search.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// True when any record belongs to `source`
    async fn exists(&self, source: &Source) -> StorageResult<bool>;

    /// Insert or overwrite the record with the same id
    async fn upsert(&self, record: EmbeddingRecord) -> StorageResult<()>;

    /// Insert or overwrite a batch of records.
    ///
    /// Backends that can write a batch in one round trip override this; the
    /// default stops at the first failing record.
    async fn upsert_many(&self, records: Vec<EmbeddingRecord>) -> StorageResult<()> {
        for record in records {
            self.upsert(record).await?;
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> StorageResult<Option<EmbeddingRecord>>;

    /// At most `k` records matching `filter`, closest first
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &RecordFilter,
    ) -> StorageResult<Vec<ScoredRecord>>;

    /// Remove every record and the completion marker of `source`; returns the number of records removed
    async fn delete_source(&self, source: &Source) -> StorageResult<usize>;

    async fn is_complete(&self, source: &Source) -> StorageResult<bool>;

    async fn mark_complete(&self, source: &Source) -> StorageResult<()>;

    async fn count(&self, filter: &RecordFilter) -> StorageResult<usize>;

    /// Make pending writes durable. Backends that write through may ignore this.
    async fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Reject vectors of the wrong size or with non-finite components
pub(crate) fn validate_vector(vector: &[f32], dimension: usize) -> StorageResult<()> {
    if vector.len() != dimension {
        return Err(StorageError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(StorageError::InvalidVector(
            "vector contains NaN or infinite components".to_string(),
        ));
    }
    Ok(())
}
