use crate::error::{ClientError, Result};
use crate::retry::with_retry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// VLM image description, used by the deep processing round to transcribe
/// images, PDF pages, and presentation slides (§4.5). Kept separate from
/// [`crate::LlmClient`] since its wire contract (image bytes in, text out)
/// doesn't fit a chat message list.
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn describe_image(&self, image: &[u8], prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct DescribeRequest<'a> {
    image_base64: String,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct DescribeResponse {
    text: String,
}

pub struct HttpVisionClient {
    http: reqwest::Client,
    base_url: String,
    max_attempts: u32,
    retry_base_delay: Duration,
}

impl HttpVisionClient {
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

    async fn describe_once(&self, image: &[u8], prompt: &str) -> Result<String> {
        use base64::Engine;
        let url = format!("{}/vision/describe", self.base_url);
        let body = DescribeRequest {
            image_base64: base64::engine::general_purpose::STANDARD.encode(image),
            prompt,
        };
        let response = self
            .http
            .post(&url)
            .json(&body)
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
                service: "vision",
                status,
                body,
            });
        }

        let decoded: DescribeResponse = response
            .json()
            .await
            .map_err(|source| ClientError::Request { url, source })?;
        Ok(decoded.text)
    }
}

#[async_trait]
impl VisionClient for HttpVisionClient {
    async fn describe_image(&self, image: &[u8], prompt: &str) -> Result<String> {
        with_retry(self.max_attempts, self.retry_base_delay, || {
            self.describe_once(image, prompt)
        })
        .await
    }
}
