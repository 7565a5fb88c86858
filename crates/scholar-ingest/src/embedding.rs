//! Client for the external embedding service
//!
//! The service takes an ordered list of texts and answers with one vector per
//! text, in the same order.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use scholar_common::{Result, ScholarError};

/// Default timeout for an embedding request in seconds
pub const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 300;

/// Turns texts into vectors
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed `texts`, returning one vector per text in input order
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}

/// One vector in the service response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub vector: Vec<f32>,
}

/// HTTP client for the `/create_embeddings` endpoint
#[derive(Clone)]
pub struct HttpEmbeddingClient {
    client: Client,
    base_url: String,
}

impl HttpEmbeddingClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_EMBEDDING_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScholarError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/create_embeddings", self.base_url)
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingClient {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let requested = texts.len();
        debug!(texts = requested, "Requesting embeddings");

        let response = self
            .client
            .post(self.endpoint())
            .json(&texts)
            .send()
            .await
            .map_err(|e| ScholarError::Enrichment(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScholarError::Enrichment(format!(
                "service answered {}: {}",
                status, body
            )));
        }

        let embeddings: Vec<Embedding> = response
            .json()
            .await
            .map_err(|e| ScholarError::Enrichment(format!("malformed response: {}", e)))?;

        if embeddings.len() != requested {
            return Err(ScholarError::EnrichmentMismatch {
                expected: requested,
                actual: embeddings.len(),
            });
        }

        Ok(embeddings.into_iter().map(|e| e.vector).collect())
    }
}
