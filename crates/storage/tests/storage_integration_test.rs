//! Integration tests for vector store backends
//!
//! The local-store tests run everywhere. The Qdrant tests need a live server:
//! `docker run -p 6333:6333 -p 6334:6334 qdrant/qdrant`
//!
//! Run them with: `cargo test --package video-search-storage --test storage_integration_test -- --ignored --nocapture`

use std::path::PathBuf;
use video_search_common::{
    record_id, EmbeddingRecord, Modality, RecordMetadata, SceneFrame, Source, TranscriptSegment,
};
use video_search_storage::*;

const DIM: usize = 4;

/// Check if Qdrant is available
async fn is_qdrant_available() -> bool {
    tokio::net::TcpStream::connect("127.0.0.1:6334")
        .await
        .is_ok()
}

fn unit(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis % DIM] = 1.0;
    v
}

fn text(source: &Source, idx: usize, start: f64, vector: Vec<f32>) -> EmbeddingRecord {
    let segment = TranscriptSegment {
        start_offset_seconds: start,
        end_offset_seconds: start + 2.0,
        text: format!("segment {idx}"),
    };
    EmbeddingRecord {
        id: record_id(source, idx, Modality::Text),
        vector,
        metadata: RecordMetadata::text(source, &segment),
    }
}

fn image(source: &Source, idx: usize, scene: u32, vector: Vec<f32>) -> EmbeddingRecord {
    let frame = SceneFrame {
        scene_index: scene,
        frame_index_within_scene: 0,
        frame_id: idx as u64 * 30,
        timestamp_seconds: idx as f64,
        image_path: PathBuf::from("frame.jpg"),
    };
    EmbeddingRecord {
        id: record_id(source, idx, Modality::Image),
        vector,
        metadata: RecordMetadata::image(source, &frame),
    }
}

async fn seed(store: &dyn VectorStore, a: &Source, b: &Source) {
    store.upsert(text(a, 0, 0.0, unit(0))).await.unwrap();
    store.upsert(text(a, 1, 5.0, unit(1))).await.unwrap();
    store.upsert(image(a, 0, 0, unit(0))).await.unwrap();
    store.upsert(image(a, 1, 1, unit(2))).await.unwrap();
    store.upsert(text(b, 0, 3661.0, unit(0))).await.unwrap();
}

/// Shared assertions on output scopes, run against every backend
async fn check_output_scopes(store: &dyn VectorStore, a: &Source, b: &Source) {
    let hits = store
        .query(&unit(0), 10, &OutputScope::Text.filter(a))
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits
        .iter()
        .all(|h| h.metadata.modality() == Modality::Text && &h.metadata.source == a));
    assert_eq!(hits[0].id, record_id(a, 0, Modality::Text));

    let hits = store
        .query(&unit(2), 1, &OutputScope::Image.filter(a))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, record_id(a, 1, Modality::Image));

    let hits = store
        .query(&unit(0), 10, &OutputScope::Both.filter(a))
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|h| h.metadata.modality() == Modality::Text));
    assert!(hits.iter().any(|h| &h.metadata.source == b));

    let hits = store
        .query(&unit(0), 10, &OutputScope::Image.filter(b))
        .await
        .unwrap();
    assert!(hits.is_empty());
}

// ============================================================================
// Local store
// ============================================================================

#[tokio::test]
async fn test_local_output_scopes() {
    let store = LocalVectorStore::in_memory(DIM);
    let a = Source::parse("https://example.com/a.mp4").unwrap();
    let b = Source::parse("https://example.com/b.mp4").unwrap();

    seed(&store, &a, &b).await;
    check_output_scopes(&store, &a, &b).await;
}

#[tokio::test]
async fn test_local_persistence_and_repair() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");
    let a = Source::parse("https://example.com/a.mp4").unwrap();
    let b = Source::parse("https://example.com/b.mp4").unwrap();

    {
        let store = LocalVectorStore::open(&path, DIM).await.unwrap();
        seed(&store, &a, &b).await;
        store.mark_complete(&b).await.unwrap();
        store.flush().await.unwrap();
    }

    let store = LocalVectorStore::open(&path, DIM).await.unwrap();
    assert_eq!(store.count(&RecordFilter::default()).await.unwrap(), 5);
    assert!(store.exists(&a).await.unwrap());
    assert!(!store.is_complete(&a).await.unwrap());
    assert!(store.is_complete(&b).await.unwrap());

    // `a` was never marked complete: a repair deletes its records only
    assert_eq!(store.delete_source(&a).await.unwrap(), 4);
    let store = LocalVectorStore::open(&path, DIM).await.unwrap();
    assert!(!store.exists(&a).await.unwrap());
    assert_eq!(store.count(&RecordFilter::for_source(&b)).await.unwrap(), 1);
}

#[tokio::test]
async fn test_local_concurrent_upserts() {
    let store = std::sync::Arc::new(LocalVectorStore::in_memory(DIM));
    let source = Source::parse("https://example.com/a.mp4").unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            let source = source.clone();
            tokio::spawn(async move { store.upsert(text(&source, i, i as f64, unit(i))).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(
        store
            .count(&RecordFilter::for_source(&source))
            .await
            .unwrap(),
        16
    );
}

// ============================================================================
// Qdrant
// ============================================================================

fn qdrant_config(collection: &str) -> QdrantConfig {
    QdrantConfig {
        collection: collection.to_string(),
        vector_dim: DIM as u64,
        ..QdrantConfig::default()
    }
}

#[tokio::test]
#[ignore] // Requires Qdrant running on localhost:6334
async fn test_qdrant_output_scopes() {
    if !is_qdrant_available().await {
        eprintln!("Qdrant not available on 127.0.0.1:6334");
        eprintln!("Skipping test_qdrant_output_scopes");
        return;
    }

    let store = QdrantVectorStore::connect(qdrant_config("test_output_scopes"))
        .await
        .expect("Failed to connect to Qdrant");
    let a = Source::parse("https://example.com/qdrant-a.mp4").unwrap();
    let b = Source::parse("https://example.com/qdrant-b.mp4").unwrap();
    store.delete_source(&a).await.unwrap();
    store.delete_source(&b).await.unwrap();

    seed(&store, &a, &b).await;
    check_output_scopes(&store, &a, &b).await;

    store.delete_source(&a).await.unwrap();
    store.delete_source(&b).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Qdrant running on localhost:6334
async fn test_qdrant_markers_and_get() {
    if !is_qdrant_available().await {
        eprintln!("Qdrant not available on 127.0.0.1:6334");
        eprintln!("Skipping test_qdrant_markers_and_get");
        return;
    }

    let store = QdrantVectorStore::connect(qdrant_config("test_markers"))
        .await
        .expect("Failed to connect to Qdrant");
    let source = Source::parse("https://example.com/qdrant-markers.mp4").unwrap();
    store.delete_source(&source).await.unwrap();

    let record = text(&source, 0, 12.0, unit(1));
    store.upsert(record.clone()).await.unwrap();
    assert!(store.exists(&source).await.unwrap());
    assert!(!store.is_complete(&source).await.unwrap());

    let fetched = store.get(&record.id).await.unwrap().expect("record stored");
    assert_eq!(fetched.metadata, record.metadata);
    assert_eq!(fetched.vector.len(), DIM);

    store.mark_complete(&source).await.unwrap();
    assert!(store.is_complete(&source).await.unwrap());

    assert_eq!(store.delete_source(&source).await.unwrap(), 1);
    assert!(!store.exists(&source).await.unwrap());
    assert!(!store.is_complete(&source).await.unwrap());
}
