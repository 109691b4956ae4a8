//! Vector store backed by Qdrant
//!
//! Records go to one collection (cosine distance, HNSW). Completion markers
//! go to a companion `{collection}_sources` collection holding one point per
//! completed source.

use crate::{validate_vector, RecordFilter, ScoredRecord, StorageError, StorageResult, VectorStore};
use qdrant_client::{
    qdrant::{
        value::Kind, vectors_output::VectorsOptions, Condition, CountPointsBuilder,
        CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, GetPointsBuilder,
        HnswConfigDiffBuilder, PointId, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
        Value, VectorParamsBuilder,
    },
    Qdrant,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;
use video_search_common::{EmbeddingRecord, RecordMetadata, Source};

/// Qdrant configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    /// Qdrant gRPC URL (e.g., "<http://localhost:6334>")
    pub url: String,

    /// API key (optional, for cloud deployment)
    pub api_key: Option<String>,

    /// Record collection name
    pub collection: String,

    /// Vector dimension (512 for CLIP ViT-B/32)
    pub vector_dim: u64,

    /// HNSW graph degree
    pub hnsw_m: u64,

    /// HNSW build-time candidate list size
    pub hnsw_ef_construct: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("QDRANT_URL")
                .unwrap_or_else(|_| "http://localhost:6334".to_string()),
            api_key: std::env::var("QDRANT_API_KEY").ok(),
            collection: "video_embeddings".to_string(),
            vector_dim: 512,
            hnsw_m: 32,
            hnsw_ef_construct: 200,
        }
    }
}

const FIELD_SOURCE: &str = "source";
const FIELD_MODALITY: &str = "modality";
const FIELD_RECORD_ID: &str = "record_id";
const FIELD_ANCHOR: &str = "anchor_seconds";
const FIELD_METADATA: &str = "metadata";

/// Deterministic point id for a string key
fn point_uuid(key: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}

fn qdrant_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::QdrantError(e.to_string())
}

fn to_qdrant_filter(filter: &RecordFilter) -> Option<Filter> {
    let mut conditions = Vec::with_capacity(2);
    if let Some(modality) = filter.modality {
        conditions.push(Condition::matches(FIELD_MODALITY, modality.as_str().to_string()));
    }
    if let Some(source) = &filter.source {
        conditions.push(Condition::matches(FIELD_SOURCE, source.as_str().to_string()));
    }
    if conditions.is_empty() {
        None
    } else {
        Some(Filter::must(conditions))
    }
}

fn record_payload(record: &EmbeddingRecord) -> StorageResult<HashMap<String, Value>> {
    let mut payload = HashMap::with_capacity(5);
    payload.insert(
        FIELD_SOURCE.to_string(),
        record.metadata.source.as_str().to_string().into(),
    );
    payload.insert(
        FIELD_MODALITY.to_string(),
        record.metadata.modality().as_str().to_string().into(),
    );
    payload.insert(FIELD_RECORD_ID.to_string(), record.id.clone().into());
    payload.insert(FIELD_ANCHOR.to_string(), record.metadata.anchor_seconds.into());
    payload.insert(
        FIELD_METADATA.to_string(),
        serde_json::to_string(&record.metadata)?.into(),
    );
    Ok(payload)
}

/// Recover `(record_id, metadata)` from a point payload
fn parse_payload(payload: &HashMap<String, Value>) -> StorageResult<(String, RecordMetadata)> {
    let string_field = |name: &str| -> StorageResult<String> {
        match payload.get(name).and_then(|v| v.kind.as_ref()) {
            Some(Kind::StringValue(s)) => Ok(s.clone()),
            _ => Err(StorageError::SerializationError(format!(
                "point payload is missing '{name}'"
            ))),
        }
    };

    let id = string_field(FIELD_RECORD_ID)?;
    let metadata: RecordMetadata = serde_json::from_str(&string_field(FIELD_METADATA)?)?;
    Ok((id, metadata))
}

/// Qdrant-backed [`VectorStore`]
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    sources_collection: String,
    vector_dim: u64,
}

impl QdrantVectorStore {
    /// Connect and make sure both collections exist
    pub async fn connect(config: QdrantConfig) -> StorageResult<Self> {
        let mut builder = Qdrant::from_url(&config.url);
        if let Some(api_key) = &config.api_key {
            builder = builder.api_key(api_key.clone());
        }
        let client = builder.build().map_err(qdrant_err)?;

        let store = Self {
            client,
            sources_collection: format!("{}_sources", config.collection),
            collection: config.collection,
            vector_dim: config.vector_dim,
        };
        store
            .init_collections(config.hnsw_m, config.hnsw_ef_construct)
            .await?;
        Ok(store)
    }

    async fn init_collections(&self, m: u64, ef_construct: u64) -> StorageResult<()> {
        if !self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(qdrant_err)?
        {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection)
                        .vectors_config(VectorParamsBuilder::new(self.vector_dim, Distance::Cosine))
                        .hnsw_config(HnswConfigDiffBuilder::default().m(m).ef_construct(ef_construct)),
                )
                .await
                .map_err(qdrant_err)?;
            info!("Created Qdrant collection: {}", self.collection);
        }

        if !self
            .client
            .collection_exists(&self.sources_collection)
            .await
            .map_err(qdrant_err)?
        {
            // Marker points carry a constant one-element vector
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.sources_collection)
                        .vectors_config(VectorParamsBuilder::new(1, Distance::Dot)),
                )
                .await
                .map_err(qdrant_err)?;
            info!("Created Qdrant collection: {}", self.sources_collection);
        }

        Ok(())
    }

    async fn count_matching(&self, filter: &RecordFilter) -> StorageResult<usize> {
        let mut builder = CountPointsBuilder::new(&self.collection).exact(true);
        if let Some(f) = to_qdrant_filter(filter) {
            builder = builder.filter(f);
        }
        let response = self.client.count(builder).await.map_err(qdrant_err)?;
        Ok(response.result.map_or(0, |r| r.count as usize))
    }
}

#[async_trait::async_trait]
impl VectorStore for QdrantVectorStore {
    async fn exists(&self, source: &Source) -> StorageResult<bool> {
        Ok(self.count_matching(&RecordFilter::for_source(source)).await? > 0)
    }

    async fn upsert(&self, record: EmbeddingRecord) -> StorageResult<()> {
        self.upsert_many(vec![record]).await
    }

    async fn upsert_many(&self, records: Vec<EmbeddingRecord>) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut points = Vec::with_capacity(records.len());
        for record in records {
            validate_vector(&record.vector, self.vector_dim as usize)?;
            let payload = record_payload(&record)?;
            points.push(PointStruct::new(point_uuid(&record.id), record.vector, payload));
        }

        debug!("Upserting {} points into {}", points.len(), self.collection);
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(qdrant_err)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> StorageResult<Option<EmbeddingRecord>> {
        let points = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.collection, vec![PointId::from(point_uuid(id))])
                    .with_payload(true)
                    .with_vectors(true),
            )
            .await
            .map_err(qdrant_err)?;

        let Some(point) = points.result.into_iter().next() else {
            return Ok(None);
        };

        let (record_id, metadata) = parse_payload(&point.payload)?;
        let vector = point
            .vectors
            .and_then(|v| v.vectors_options)
            .and_then(|opts| match opts {
                VectorsOptions::Vector(v) => Some(v.data),
                _ => None,
            })
            .ok_or_else(|| StorageError::QdrantError("No vector data found".to_string()))?;

        Ok(Some(EmbeddingRecord {
            id: record_id,
            vector,
            metadata,
        }))
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
        validate_vector(vector, self.vector_dim as usize)?;

        let mut builder = SearchPointsBuilder::new(&self.collection, vector.to_vec(), k as u64)
            .with_payload(true);
        if let Some(f) = to_qdrant_filter(filter) {
            builder = builder.filter(f);
        }

        let response = self.client.search_points(builder).await.map_err(qdrant_err)?;
        debug!("Qdrant returned {} hits", response.result.len());

        response
            .result
            .into_iter()
            .map(|point| {
                let (id, metadata) = parse_payload(&point.payload)?;
                Ok(ScoredRecord {
                    id,
                    metadata,
                    distance: 1.0 - point.score,
                })
            })
            .collect()
    }

    async fn delete_source(&self, source: &Source) -> StorageResult<usize> {
        let filter = RecordFilter::for_source(source);
        // Qdrant does not report how many points a delete removed
        let removed = self.count_matching(&filter).await?;

        if let Some(f) = to_qdrant_filter(&filter) {
            self.client
                .delete_points(DeletePointsBuilder::new(&self.collection).points(f).wait(true))
                .await
                .map_err(qdrant_err)?;
        }
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.sources_collection)
                    .points(vec![PointId::from(point_uuid(source.as_str()))])
                    .wait(true),
            )
            .await
            .map_err(qdrant_err)?;

        info!("Deleted {} points for {}", removed, source);
        Ok(removed)
    }

    async fn is_complete(&self, source: &Source) -> StorageResult<bool> {
        let points = self
            .client
            .get_points(GetPointsBuilder::new(
                &self.sources_collection,
                vec![PointId::from(point_uuid(source.as_str()))],
            ))
            .await
            .map_err(qdrant_err)?;
        Ok(!points.result.is_empty())
    }

    async fn mark_complete(&self, source: &Source) -> StorageResult<()> {
        let mut payload: HashMap<String, Value> = HashMap::with_capacity(1);
        payload.insert(FIELD_SOURCE.to_string(), source.as_str().to_string().into());
        let point = PointStruct::new(point_uuid(source.as_str()), vec![1.0_f32], payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.sources_collection, vec![point]).wait(true))
            .await
            .map_err(qdrant_err)?;
        Ok(())
    }

    async fn count(&self, filter: &RecordFilter) -> StorageResult<usize> {
        self.count_matching(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use video_search_common::{Modality, TranscriptSegment};

    #[test]
    fn test_qdrant_config_default() {
        let config = QdrantConfig::default();
        assert_eq!(config.collection, "video_embeddings");
        assert_eq!(config.vector_dim, 512);
        assert_eq!(config.hnsw_m, 32);
        assert_eq!(config.hnsw_ef_construct, 200);
    }

    #[test]
    fn test_point_uuid_is_deterministic() {
        let a = point_uuid("https://example.com/v_0_text");
        assert_eq!(a, point_uuid("https://example.com/v_0_text"));
        assert_ne!(a, point_uuid("https://example.com/v_0_image"));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_filter_conversion() {
        assert!(to_qdrant_filter(&RecordFilter::default()).is_none());

        let source = Source::parse("https://example.com/v").unwrap();
        let filter = to_qdrant_filter(
            &RecordFilter::for_source(&source).with_modality(Modality::Image),
        )
        .unwrap();
        assert_eq!(filter.must.len(), 2);
    }

    #[test]
    fn test_payload_roundtrip() {
        let source = Source::parse("https://example.com/v").unwrap();
        let segment = TranscriptSegment {
            start_offset_seconds: 61.5,
            end_offset_seconds: 63.0,
            text: "hello world".to_string(),
        };
        let record = EmbeddingRecord {
            id: video_search_common::record_id(&source, 3, Modality::Text),
            vector: vec![1.0, 0.0],
            metadata: RecordMetadata::text(&source, &segment),
        };

        let payload = record_payload(&record).unwrap();
        let (id, metadata) = parse_payload(&payload).unwrap();
        assert_eq!(id, record.id);
        assert_eq!(metadata, record.metadata);
    }

    #[test]
    fn test_parse_payload_missing_field() {
        assert!(parse_payload(&HashMap::new()).is_err());
    }
}
