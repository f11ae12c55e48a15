//! Typed async clients for the embedding, rerank, and LLM services (§4.8).
//!
//! All three are thin `reqwest` wrappers: per-call timeouts, a bounded
//! exponential backoff retry for transient failures, and a single
//! [`ClientError`] kind surfaced to callers once retries are exhausted.

mod embedding;
mod error;
mod llm;
mod rerank;
mod retry;
mod vision;

pub use embedding::{EmbeddingClient, HttpEmbeddingClient};
pub use error::{ClientError, Result};
pub use llm::{ChatMessage, HttpLlmClient, LlmClient, TokenStream};
pub use rerank::{HttpRerankClient, RerankClient};
pub use vision::{HttpVisionClient, VisionClient};
