use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which memory table a record belongs to (§3 "Memory records").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Episodic,
    Profile,
    Foresight,
    EventLog,
    GroupProfile,
    Core,
}

impl MemoryType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Episodic => "episode",
            Self::Profile => "profile",
            Self::Foresight => "foresight",
            Self::EventLog => "event_log",
            Self::GroupProfile => "group_profile",
            Self::Core => "core",
        }
    }
}

/// Retrieval strategy for `/memory/search`. Internals are thin (§3 is
/// "out of core detail"): every variant resolves to the same FTS5
/// keyword search, since there is no vector index over memory records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RetrieveMethod {
    Keyword,
    Vector,
    Hybrid,
    Rrf,
    Agentic,
}

impl Default for RetrieveMethod {
    fn default() -> Self {
        Self::Keyword
    }
}

/// Narrative summary of an event or experience, owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EpisodeRecord {
    pub id: String,
    pub user_id: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A fine-grained atomic fact extracted from an episode.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EventLogRecord {
    pub id: String,
    pub user_id: String,
    pub atomic_fact: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_episode_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A prediction or prospective association derived from episodes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ForesightRecord {
    pub id: String,
    pub user_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_episode_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Slowly-changing facts about a user, one row per `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProfileRecord {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personality: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interests: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hard_skills: Option<Vec<HashMap<String, String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soft_skills: Option<Vec<HashMap<String, String>>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// `POST /memory/memorize` request body: directly-supplied memory
/// fragments, rather than raw text requiring LLM extraction (§3 marks
/// memory internals as out of core detail; extraction is a Non-goal
/// here).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MemorizeRequest {
    pub user_id: String,
    #[serde(default)]
    pub episode: Option<EpisodeDraft>,
    #[serde(default)]
    pub event_logs: Vec<EventLogDraft>,
    #[serde(default)]
    pub foresights: Vec<ForesightDraft>,
    #[serde(default)]
    pub profile: Option<ProfileDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EpisodeDraft {
    pub summary: String,
    #[serde(default)]
    pub episode: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EventLogDraft {
    pub atomic_fact: String,
    #[serde(default)]
    pub parent_episode_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ForesightDraft {
    pub content: String,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub parent_episode_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProfileDraft {
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub personality: Option<Vec<String>>,
    #[serde(default)]
    pub interests: Option<Vec<String>>,
    #[serde(default)]
    pub hard_skills: Option<Vec<HashMap<String, String>>>,
    #[serde(default)]
    pub soft_skills: Option<Vec<HashMap<String, String>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MemorizeResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<String>,
    #[serde(default)]
    pub event_log_ids: Vec<String>,
    #[serde(default)]
    pub foresight_ids: Vec<String>,
    pub profile_updated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchMemoryRequest {
    pub user_id: String,
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub method: RetrieveMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MemorySearchHit {
    pub memory_id: String,
    pub memory_type: MemoryType,
    pub content: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SearchMemoryResult {
    pub hits: Vec<MemorySearchHit>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UserMemorySummary {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileRecord>,
    pub episode_count: usize,
    pub event_log_count: usize,
    pub foresight_count: usize,
}
