//! Local vector store
//!
//! Records live in memory behind a `tokio::sync::RwLock` and are searched by
//! brute force. Every mutation rewrites a JSON snapshot next to the index path
//! and renames it into place, so a crash leaves either the old or the new
//! snapshot on disk. A mutation whose snapshot cannot be written is rolled
//! back in memory before the error is returned.

use crate::{
    validate_vector, RecordFilter, ScoredRecord, StorageError, StorageResult, VectorStore,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};
use video_search_common::{EmbeddingRecord, Source};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    dimension: usize,
    records: BTreeMap<String, EmbeddingRecord>,
    #[serde(default)]
    complete: BTreeSet<Source>,
}

impl Snapshot {
    fn empty(dimension: usize) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            dimension,
            records: BTreeMap::new(),
            complete: BTreeSet::new(),
        }
    }
}

/// Brute-force cosine index persisted to a single JSON file
pub struct LocalVectorStore {
    path: Option<PathBuf>,
    dimension: usize,
    state: RwLock<Snapshot>,
}

impl LocalVectorStore {
    /// Open the index at `path`, creating an empty one when the file is absent.
    ///
    /// Fails if the file on disk was written for a different dimension.
    pub async fn open(path: impl AsRef<Path>, dimension: usize) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if dimension == 0 {
            return Err(StorageError::InvalidConfig(
                "vector dimension must be positive".to_string(),
            ));
        }

        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(StorageError::InvalidConfig(format!(
                        "unsupported index version {} in {}",
                        snapshot.version,
                        path.display()
                    )));
                }
                if snapshot.dimension != dimension {
                    return Err(StorageError::DimensionMismatch {
                        expected: dimension,
                        actual: snapshot.dimension,
                    });
                }
                info!(
                    "Opened local index {} ({} records, {} complete sources)",
                    path.display(),
                    snapshot.records.len(),
                    snapshot.complete.len()
                );
                snapshot
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Creating local index at {}", path.display());
                Snapshot::empty(dimension)
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path),
            dimension,
            state: RwLock::new(snapshot),
        })
    }

    /// Index that is never written to disk
    #[must_use]
    pub fn in_memory(dimension: usize) -> Self {
        Self {
            path: None,
            dimension,
            state: RwLock::new(Snapshot::empty(dimension)),
        }
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write `snapshot` to a sibling temp file, then rename it over the index.
    ///
    /// Callers hold the write lock, so snapshots are never interleaved.
    async fn persist(&self, snapshot: &Snapshot) -> StorageResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec(snapshot)?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!("Persisted {} records to {}", snapshot.records.len(), path.display());
        Ok(())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[async_trait::async_trait]
impl VectorStore for LocalVectorStore {
    async fn exists(&self, source: &Source) -> StorageResult<bool> {
        let state = self.state.read().await;
        Ok(state.records.values().any(|r| &r.metadata.source == source))
    }

    async fn upsert(&self, record: EmbeddingRecord) -> StorageResult<()> {
        self.upsert_many(vec![record]).await
    }

    async fn upsert_many(&self, records: Vec<EmbeddingRecord>) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        for record in &records {
            validate_vector(&record.vector, self.dimension)?;
        }

        let mut state = self.state.write().await;
        let mut previous = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id.clone();
            let old = state.records.insert(id.clone(), record);
            previous.push((id, old));
        }

        if let Err(e) = self.persist(&state).await {
            for (id, old) in previous.into_iter().rev() {
                match old {
                    Some(record) => state.records.insert(id, record),
                    None => state.records.remove(&id),
                };
            }
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> StorageResult<Option<EmbeddingRecord>> {
        Ok(self.state.read().await.records.get(id).cloned())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &RecordFilter,
    ) -> StorageResult<Vec<ScoredRecord>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        validate_vector(vector, self.dimension)?;

        let state = self.state.read().await;
        let mut hits: Vec<ScoredRecord> = state
            .records
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .map(|r| ScoredRecord {
                id: r.id.clone(),
                metadata: r.metadata.clone(),
                distance: 1.0 - dot(vector, &r.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete_source(&self, source: &Source) -> StorageResult<usize> {
        let mut state = self.state.write().await;
        let ids: Vec<String> = state
            .records
            .values()
            .filter(|r| &r.metadata.source == source)
            .map(|r| r.id.clone())
            .collect();
        let removed: Vec<EmbeddingRecord> = ids
            .iter()
            .filter_map(|id| state.records.remove(id))
            .collect();
        let unmarked = state.complete.remove(source);

        if removed.is_empty() && !unmarked {
            return Ok(0);
        }
        if let Err(e) = self.persist(&state).await {
            let count = removed.len();
            for record in removed {
                state.records.insert(record.id.clone(), record);
            }
            if unmarked {
                state.complete.insert(source.clone());
            }
            debug!("Restored {} records of {} after failed write", count, source);
            return Err(e);
        }
        Ok(removed.len())
    }

    async fn is_complete(&self, source: &Source) -> StorageResult<bool> {
        Ok(self.state.read().await.complete.contains(source))
    }

    async fn mark_complete(&self, source: &Source) -> StorageResult<()> {
        let mut state = self.state.write().await;
        if state.complete.insert(source.clone()) {
            if let Err(e) = self.persist(&state).await {
                state.complete.remove(source);
                return Err(e);
            }
        }
        Ok(())
    }

    async fn count(&self, filter: &RecordFilter) -> StorageResult<usize> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .count())
    }

    async fn flush(&self) -> StorageResult<()> {
        let state = self.state.read().await;
        self.persist(&state).await
    }
}
