use serde::{Deserialize, Serialize};

use crate::SearchHit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingStepStatus {
    Running,
    Complete,
    Failed,
}

/// Progress event emitted by each retrieval stage (§4.7.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingStep {
    pub id: String,
    pub title: String,
    pub status: ThinkingStepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queries: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// The newline-delimited JSON protocol streamed by `/search/stream` (§4.7.6).
///
/// Serializes as `{"type": "...", "data": ...}` via `#[serde(tag = "type",
/// content = "data")]`, matching the shape the spec enumerates literally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Status(String),
    ThinkingStep(ThinkingStep),
    Hits(Vec<SearchHit>),
    Token(String),
    Error(String),
    Done(Option<String>),
}

impl StreamEvent {
    /// Renders one NDJSON line, newline included.
    #[must_use]
    pub fn to_ndjson_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| {
            "{\"type\":\"error\",\"data\":\"event serialization failed\"}".to_string()
        });
        line.push('\n');
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_has_expected_shape() {
        let event = StreamEvent::Status("searching".to_string());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["data"], "searching");
    }

    #[test]
    fn done_event_allows_missing_data() {
        let event = StreamEvent::Done(None);
        let line = event.to_ndjson_line();
        assert!(line.ends_with('\n'));
        assert!(line.contains("\"type\":\"done\""));
    }
}
