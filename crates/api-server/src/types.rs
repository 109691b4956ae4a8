//! API request and response types

use serde::{Deserialize, Serialize};
use video_search_orchestrator::{OutputScope, DEFAULT_RESULTS};

/// Body of `POST /api/v1/embed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedRequest {
    /// Source video URL
    pub url: String,
}

/// Query half of a search request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueryBody {
    Text {
        query: String,
    },
    /// Exactly one of `url` or `data` (base64) must be set
    Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },
}

/// Body of `POST /api/v1/search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchBody {
    pub video_url: String,
    #[serde(default = "default_n_results")]
    pub n_results: usize,
    pub output_from: OutputScope,
    pub query: QueryBody,
}

fn default_n_results() -> usize {
    DEFAULT_RESULTS
}

/// Reply of `POST /api/v1/embed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub status: String,
    pub message: String,
}

/// Reply of `POST /api/v1/search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub status: String,
    /// `HH:MM:SS` anchors, closest first
    pub results: Vec<String>,
}

/// Body of every non-2xx reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_body_defaults() {
        let body: SearchBody = serde_json::from_str(
            r#"{"video_url": "https://example.com/a.mp4", "output_from": "both",
                "query": {"type": "text", "query": "a red car"}}"#,
        )
        .unwrap();
        assert_eq!(body.n_results, 5);
        assert_eq!(body.output_from, OutputScope::Both);
        assert_eq!(
            body.query,
            QueryBody::Text {
                query: "a red car".to_string()
            }
        );
    }

    #[test]
    fn test_image_query_variants() {
        let by_url: QueryBody =
            serde_json::from_str(r#"{"type": "image", "url": "https://example.com/cat.jpg"}"#)
                .unwrap();
        assert_eq!(
            by_url,
            QueryBody::Image {
                url: Some("https://example.com/cat.jpg".to_string()),
                data: None
            }
        );

        let inline: QueryBody = serde_json::from_str(r#"{"type": "image", "data": "aGk="}"#).unwrap();
        assert!(matches!(inline, QueryBody::Image { url: None, data: Some(_) }));
    }

    #[test]
    fn test_unknown_query_type_is_rejected() {
        assert!(serde_json::from_str::<QueryBody>(r#"{"type": "audio", "query": "x"}"#).is_err());
        assert!(serde_json::from_str::<SearchBody>(
            r#"{"video_url": "u", "output_from": "video", "query": {"type": "text", "query": "x"}}"#
        )
        .is_err());
    }
}
