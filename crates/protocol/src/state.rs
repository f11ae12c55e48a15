use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Top-level status of the indexer, published by the State Manager (C1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IndexingStatus {
    Idle,
    Running,
    Paused,
    Error,
}

/// Singleton snapshot of indexer progress. Writer-exclusive to the State
/// Manager; readers always observe a complete, non-torn snapshot (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IndexingState {
    pub status: IndexingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_current: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_total: Option<u64>,
    pub progress: f32,
}

impl Default for IndexingState {
    fn default() -> Self {
        Self {
            status: IndexingStatus::Idle,
            message: None,
            last_error: None,
            active_stage: None,
            step_current: None,
            step_total: None,
            progress: 0.0,
        }
    }
}

impl IndexingState {
    #[must_use]
    pub fn clamp_progress(mut self) -> Self {
        self.progress = self.progress.clamp(0.0, 100.0);
        self
    }
}
