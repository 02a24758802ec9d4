//! Enrichment: natural-language summaries of exception kinds
//!
//! Provides an `EnrichmentClient` trait with an HTTP implementation that calls
//! the inference service: `GET <url>?name=<kind>` answering
//! `{"inference_output": "..."}`. Every failure mode maps to an
//! `EnrichmentError`; callers treat all of them as "enrichment unavailable".

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::EnrichmentConfig;

// ============================================================================
// EnrichmentClient trait
// ============================================================================

/// Abstraction over summary providers.
#[async_trait]
pub trait EnrichmentClient: Send + Sync {
    /// Produce a summary for an exception kind. The kind is the only input.
    async fn summarize(&self, kind: &str) -> Result<String, EnrichmentError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Invalid response body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("Missing inference_output in response")]
    MissingOutput,
}

// ============================================================================
// Inference API structs (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    inference_output: Option<String>,
}

// ============================================================================
// HttpEnrichmentClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpEnrichmentClient {
    client: Client,
    url: String,
    query_param: String,
}

impl HttpEnrichmentClient {
    pub fn new(config: &EnrichmentConfig) -> Result<Self, EnrichmentError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            url: config.url.clone(),
            query_param: config.query_param.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EnrichmentClient for HttpEnrichmentClient {
    async fn summarize(&self, kind: &str) -> Result<String, EnrichmentError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[(self.query_param.as_str(), kind)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(code = status.as_u16(), kind, "Enrichment API error");
            return Err(EnrichmentError::Api {
                code: status.as_u16(),
                message: body,
            });
        }

        let parsed: InferenceResponse = serde_json::from_str(&body)?;
        parsed.inference_output.ok_or(EnrichmentError::MissingOutput)
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpEnrichmentClient {
        let config = EnrichmentConfig {
            url: format!("{}/exception-llm-summary", server.uri()),
            query_param: "name".to_string(),
            timeout_seconds: Some(5),
        };
        HttpEnrichmentClient::new(&config).expect("Failed to create client")
    }

    #[tokio::test]
    async fn test_summarize_sends_kind_as_query_param() {
        let mock_server = MockServer::start().await;
        let client = client_for(&mock_server);

        Mock::given(method("GET"))
            .and(path("/exception-llm-summary"))
            .and(query_param("name", "NullPointerException"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "inference_output": "Null reference accessed"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let summary = client.summarize("NullPointerException").await;

        assert_eq!(summary.unwrap(), "Null reference accessed");
    }

    #[tokio::test]
    async fn test_summarize_returns_api_error_without_retrying() {
        let mock_server = MockServer::start().await;
        let client = client_for(&mock_server);

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
            .expect(1)
            .mount(&mock_server)
            .await;

        match client.summarize("OrderNotFound").await {
            Err(EnrichmentError::Api { code, message }) => {
                assert_eq!(code, 503);
                assert_eq!(message, "model loading");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_summarize_rejects_non_json_body() {
        let mock_server = MockServer::start().await;
        let client = client_for(&mock_server);

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let result = client.summarize("CartEmpty").await;
        assert!(matches!(result, Err(EnrichmentError::InvalidBody(_))));
    }

    #[tokio::test]
    async fn test_summarize_rejects_missing_output_field() {
        let mock_server = MockServer::start().await;
        let client = client_for(&mock_server);

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"answer": "x"})),
            )
            .mount(&mock_server)
            .await;

        let result = client.summarize("CartEmpty").await;
        assert!(matches!(result, Err(EnrichmentError::MissingOutput)));
    }

    #[tokio::test]
    async fn test_summarize_reports_unreachable_service() {
        let config = EnrichmentConfig {
            url: "http://127.0.0.1:1/exception-llm-summary".to_string(),
            query_param: "name".to_string(),
            timeout_seconds: Some(2),
        };
        let client = HttpEnrichmentClient::new(&config).unwrap();

        let result = client.summarize("CartEmpty").await;
        assert!(matches!(result, Err(EnrichmentError::Http(_))));
        assert_eq!(client.name(), "http");
    }
}
