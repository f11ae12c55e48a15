use serde::{Deserialize, Serialize};

/// Upstream AI service URLs (§6 health-cache contract). Distinct from
/// [`context_protocol::Settings`], which only carries tunable indexing
/// knobs, never service locations. The vision endpoint doubles as the
/// chat-completion (LLM) endpoint, matching the original's single
/// "Vision/LLM" health probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub embedding: String,
    pub rerank: String,
    pub vision: Option<String>,
    pub transcription: Option<String>,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            embedding: "http://127.0.0.1:8001".to_string(),
            rerank: "http://127.0.0.1:8002".to_string(),
            vision: None,
            transcription: None,
        }
    }
}
