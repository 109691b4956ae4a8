//! HTTP request handlers for API endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info, warn};
use video_search_common::Source;
use video_search_orchestrator::{
    ImageQuery, IngestError, IngestOutcome, QueryPayload, SearchError, SearchRequest,
};

use crate::{
    download::{decode_inline_image, download_image},
    types::{
        EmbedRequest, EmbedResponse, ErrorResponse, HealthResponse, QueryBody, SearchBody,
        SearchResponse,
    },
    ApiState,
};

/// Error reply: a status code plus `{"status": "error", "message": ...}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            status: "error".to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        let status = match &err {
            SearchError::Validation(_) => StatusCode::BAD_REQUEST,
            SearchError::NotFound(_) => StatusCode::NOT_FOUND,
            SearchError::Embedding(_) | SearchError::Persistence(_) | SearchError::ImageFetch(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Ingest one source video
///
/// Blocks until the pipeline finishes; a second request for an ingested
/// source returns immediately.
pub async fn embed(
    State(state): State<ApiState>,
    payload: Result<Json<EmbedRequest>, JsonRejection>,
) -> Result<Json<EmbedResponse>, ApiError> {
    let Json(request) = payload?;
    info!("Embed request: url={}", request.url);

    let outcome = state.services.ingest.ingest(&request.url).await.map_err(|e| {
        error!("Ingestion of {} failed: {}", request.url, e);
        ApiError::from(e)
    })?;

    let message = match outcome {
        IngestOutcome::Ingested {
            text_records,
            image_records,
            image_failures,
            ..
        } => {
            if image_failures > 0 {
                warn!(
                    "{}: {} frames could not be embedded",
                    request.url, image_failures
                );
            }
            format!(
                "Success: {text_records} transcript segments and {image_records} frames embedded"
            )
        }
        IngestOutcome::AlreadyIngested => "Success: video already embedded".to_string(),
    };

    Ok(Json(EmbedResponse {
        status: "success".to_string(),
        message,
    }))
}

/// Cross-modal search within (or, for `both`, across) ingested videos
pub async fn search(
    State(state): State<ApiState>,
    payload: Result<Json<SearchBody>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(body) = payload?;
    info!(
        "Search request: video_url={}, n_results={}, output_from={}",
        body.video_url, body.n_results, body.output_from
    );

    // Reject bad requests before fetching a remote query image
    Source::parse(&body.video_url).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let query = match body.query {
        QueryBody::Text { query } => QueryPayload::Text(query),
        QueryBody::Image {
            url: Some(url),
            data: None,
        } => {
            let bytes = download_image(&url).await.map_err(|e| {
                if e.is_client_error() {
                    warn!("Rejected query image {}: {}", url, e);
                    ApiError::bad_request(e.to_string())
                } else {
                    error!("Failed to download query image {}: {}", url, e);
                    ApiError::from(SearchError::ImageFetch(e.to_string()))
                }
            })?;
            QueryPayload::Image(ImageQuery::Bytes(bytes))
        }
        QueryBody::Image {
            url: None,
            data: Some(data),
        } => {
            let bytes = decode_inline_image(&data)
                .map_err(|e| ApiError::from(SearchError::Validation(format!("{e:#}"))))?;
            QueryPayload::Image(ImageQuery::Bytes(bytes))
        }
        QueryBody::Image { .. } => {
            return Err(ApiError::bad_request(
                "Provide exactly one of `url` or `data` for an image query",
            ));
        }
    };

    let results = state
        .services
        .search
        .search(SearchRequest {
            source_url: body.video_url,
            query,
            k: body.n_results,
            output_from: body.output_from,
        })
        .await?;

    Ok(Json(SearchResponse {
        status: "success".to_string(),
        results,
    }))
}
