use serde::{Deserialize, Serialize};

fn default_mode() -> String {
    "auto".to_string()
}

/// One-shot or streamed search/QA request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub folder_ids: Option<Vec<String>>,
    /// `"auto" | "direct" | "knowledge"` — see §4.7.2.
    #[serde(default = "default_mode")]
    pub search_mode: String,
}

/// QA request; identical shape to `SearchRequest` plus an optional
/// `mode` field (`"chat"` forces the direct-answer path, §4.7.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub folder_ids: Option<Vec<String>>,
    #[serde(default = "default_mode")]
    pub search_mode: String,
    #[serde(default)]
    pub mode: Option<String>,
}

impl From<QaRequest> for SearchRequest {
    fn from(req: QaRequest) -> Self {
        Self {
            query: req.query,
            limit: req.limit,
            folder_ids: req.folder_ids,
            search_mode: req.search_mode,
        }
    }
}

/// One verified/candidate chunk surfaced to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub file_id: String,
    pub path: String,
    pub snippet: String,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_query_index: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub latency_ms: u64,
}

/// One-shot QA response: the stream, fully drained (`QaMixin.answer` in
/// the original implementation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaResponse {
    pub answer: String,
    pub hits: Vec<SearchHit>,
    pub latency_ms: u64,
    pub diagnostics: Vec<serde_json::Value>,
}
