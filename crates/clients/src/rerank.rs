use crate::error::{ClientError, Result};
use crate::retry::with_retry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[async_trait]
pub trait RerankClient: Send + Sync {
    /// Scores `passages` against `query`, returning one score per passage
    /// in the same order as given (§4.8).
    async fn rerank(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    passages: &'a [String],
}

#[derive(Deserialize)]
struct RerankResponse {
    scores: Vec<f32>,
}

pub struct HttpRerankClient {
    http: reqwest::Client,
    base_url: String,
    max_attempts: u32,
    retry_base_delay: Duration,
}

impl HttpRerankClient {
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

    async fn rerank_once(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let url = format!("{}/rerank", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&RerankRequest { query, passages })
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
                service: "rerank",
                status,
                body,
            });
        }

        let decoded: RerankResponse = response
            .json()
            .await
            .map_err(|source| ClientError::Request { url, source })?;

        if decoded.scores.len() != passages.len() {
            return Err(ClientError::Decode(format!(
                "expected {} scores, got {}",
                passages.len(),
                decoded.scores.len()
            )));
        }
        Ok(decoded.scores)
    }
}

#[async_trait]
impl RerankClient for HttpRerankClient {
    async fn rerank(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        with_retry(self.max_attempts, self.retry_base_delay, || {
            self.rerank_once(query, passages)
        })
        .await
    }
}
