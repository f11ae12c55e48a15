use crate::error::{ClientError, Result};
use crate::retry::with_retry;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat_complete(&self, messages: Vec<ChatMessage>, max_tokens: u32) -> Result<String>;

    /// Yields token chunks in order. Dropping the returned stream aborts
    /// the upstream HTTP request promptly (§4.8, §7 cancellation).
    async fn stream_chat_complete(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
    ) -> Result<TokenStream>;
}

#[derive(Serialize)]
struct ChatRequest {
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    content: String,
}

pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    max_attempts: u32,
    retry_base_delay: Duration,
}

impl HttpLlmClient {
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

    async fn chat_complete_once(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&ChatRequest {
                messages: messages.to_vec(),
                max_tokens,
                stream: false,
            })
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
                service: "llm",
                status,
                body,
            });
        }

        let decoded: ChatResponse = response
            .json()
            .await
            .map_err(|source| ClientError::Request { url, source })?;
        Ok(decoded.content)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat_complete(&self, messages: Vec<ChatMessage>, max_tokens: u32) -> Result<String> {
        with_retry(self.max_attempts, self.retry_base_delay, || {
            self.chat_complete_once(&messages, max_tokens)
        })
        .await
    }

    async fn stream_chat_complete(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
    ) -> Result<TokenStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            messages,
            max_tokens,
            stream: true,
        };

        let response = with_retry(self.max_attempts, self.retry_base_delay, || {
            let url = url.clone();
            let http = &self.http;
            let request = &request;
            async move {
                let resp = http
                    .post(&url)
                    .json(request)
                    .send()
                    .await
                    .map_err(|source| ClientError::Request {
                        url: url.clone(),
                        source,
                    })?;
                if !resp.status().is_success() {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(ClientError::Status {
                        service: "llm",
                        status,
                        body,
                    });
                }
                Ok(resp)
            }
        })
        .await?;

        // HTTP byte chunks don't align on UTF-8 character boundaries, so a
        // multi-byte character split across two chunks is buffered here
        // rather than decoded chunk-by-chunk.
        let stream = response.bytes_stream().scan(Vec::<u8>::new(), |carry, chunk| {
            let decoded = (|| -> Result<String> {
                let bytes = chunk.map_err(|source| ClientError::Request {
                    url: String::new(),
                    source,
                })?;
                carry.extend_from_slice(&bytes);
                match std::str::from_utf8(carry) {
                    Ok(s) => {
                        let owned = s.to_string();
                        carry.clear();
                        Ok(owned)
                    }
                    Err(e) if e.error_len().is_none() => {
                        // trailing bytes are a truncated (not invalid) sequence; hold them for the next chunk
                        let valid_up_to = e.valid_up_to();
                        let owned = std::str::from_utf8(&carry[..valid_up_to])
                            .expect("valid_up_to guarantees this prefix is valid UTF-8")
                            .to_string();
                        carry.drain(..valid_up_to);
                        Ok(owned)
                    }
                    Err(e) => Err(ClientError::Decode(e.to_string())),
                }
            })();
            futures::future::ready(Some(decoded))
        });
        let stream = stream.filter(|item| futures::future::ready(!matches!(item, Ok(s) if s.is_empty())));
        Ok(Box::pin(stream))
    }
}
