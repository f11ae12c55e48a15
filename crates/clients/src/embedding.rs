use crate::error::{ClientError, Result};
use crate::retry::with_retry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Encodes `texts` into fixed-dimension vectors, one per input, in order.
    /// Fails with [`ClientError::DimensionMismatch`] if the service returns
    /// vectors of differing lengths within one call.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Serialize)]
struct EncodeRequest<'a> {
    input: &'a [String],
}

#[derive(Deserialize)]
struct EncodeResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedding service behind a `POST {base_url}/embeddings` endpoint.
pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    max_attempts: u32,
    retry_base_delay: Duration,
}

impl HttpEmbeddingClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client builds with a static config"),
            base_url: base_url.into(),
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(200),
        }
    }

    async fn encode_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&EncodeRequest { input: texts })
            .send()
            .await
            .map_err(|source| ClientError::Request {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                service: "embedding",
                status,
                body,
            });
        }

        let decoded: EncodeResponse = response
            .json()
            .await
            .map_err(|source| ClientError::Request { url, source })?;

        if let Some(dim) = decoded.embeddings.first().map(Vec::len) {
            if let Some(mismatched) = decoded.embeddings.iter().find(|v| v.len() != dim) {
                return Err(ClientError::DimensionMismatch {
                    expected: dim,
                    actual: mismatched.len(),
                });
            }
        }
        Ok(decoded.embeddings)
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        with_retry(self.max_attempts, self.retry_base_delay, || {
            self.encode_once(texts)
        })
        .await
    }
}
