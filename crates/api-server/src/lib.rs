//! REST API server for video search
//!
//! - `POST /api/v1/embed`: ingest a source video by URL
//! - `POST /api/v1/search`: text or image query against ingested videos
//! - `GET /health`

mod download;
mod handlers;
mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use video_search_orchestrator::Services;

pub use download::{decode_inline_image, download_image, ImageDownloadError, MAX_IMAGE_BYTES};
pub use handlers::*;
pub use types::*;

/// API server state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    pub services: Services,
}

impl ApiState {
    #[must_use]
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/embed", post(embed))
        .route("/api/v1/search", post(search))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server and run until Ctrl+C
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    info!("Starting API server on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state, shutdown_signal()).await
}

/// Serve on `listener` until `shutdown` resolves, then flush the store
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let store = state.services.store.clone();
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server stopped, flushing vector store");
    if let Err(e) = store.flush().await {
        error!("Failed to flush vector store: {}", e);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
