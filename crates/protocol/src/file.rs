use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Coarse classification of an indexed file, used to route parsing and to
/// decide deep-round eligibility (`DeepProcessor::should_process_deep`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Text,
    Document,
    Image,
    Audio,
    Video,
    Presentation,
    Other,
}

/// Per-file privacy tag, propagated into vector metadata for server-side
/// filtering. This is the full extent of multi-tenant isolation (see
/// Non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    Public,
    Private,
}

impl Default for PrivacyLevel {
    fn default() -> Self {
        Self::Public
    }
}

impl PrivacyLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// `fast_stage`/`deep_stage` counters. Both stages share the same small
/// state machine; deep additionally has a terminal-absorbing "skipped"
/// value that fast does not use.
pub type StageValue = i8;

pub const STAGE_PENDING: StageValue = 0;
pub const STAGE_TEXT_EXTRACTED: StageValue = 1;
pub const STAGE_EMBEDDED: StageValue = 2;
pub const STAGE_FAILED: StageValue = -1;
pub const STAGE_SKIPPED: StageValue = -2;

/// Identity + attributes + stage counters for one indexed file.
///
/// Invariant (§3): `deep_stage` may advance past 0 only when
/// `fast_stage == STAGE_EMBEDDED`. `deep_stage == STAGE_SKIPPED` is
/// permitted at any time and is terminal.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FileRecord {
    pub file_id: String,
    pub path: String,
    pub name: String,
    pub extension: String,
    pub kind: FileKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub privacy_level: PrivacyLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[schemars(skip)]
    pub preview_image: Option<Vec<u8>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub fast_stage: StageValue,
    #[serde(default)]
    pub deep_stage: StageValue,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fast_text_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fast_embed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_text_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_embed_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    #[must_use]
    pub fn new(file_id: impl Into<String>, path: impl Into<String>, kind: FileKind) -> Self {
        let path = path.into();
        let name = path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&path)
            .to_string();
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        Self {
            file_id: file_id.into(),
            path,
            name,
            extension,
            kind,
            folder_id: None,
            privacy_level: PrivacyLevel::default(),
            page_count: None,
            preview_image: None,
            metadata: HashMap::new(),
            fast_stage: STAGE_PENDING,
            deep_stage: STAGE_PENDING,
            fast_text_at: None,
            fast_embed_at: None,
            deep_text_at: None,
            deep_embed_at: None,
        }
    }

    #[must_use]
    pub fn deep_is_consistent(&self) -> bool {
        self.deep_stage <= STAGE_PENDING || self.fast_stage == STAGE_EMBEDDED
    }
}

/// Which of the two coexisting chunk populations a `ChunkSnapshot` belongs
/// to. Neither version dominates; callers choose which to read or merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChunkVersion {
    Fast,
    Deep,
}

impl ChunkVersion {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Deep => "deep",
        }
    }
}

/// A bounded passage of text plus metadata, the unit of retrieval.
///
/// Invariant (§3): within one `(file_id, version)` pair, `chunk_id` is
/// unique and `ordinal` is a dense non-negative range.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChunkSnapshot {
    pub chunk_id: String,
    pub file_id: String,
    pub ordinal: u32,
    pub text: String,
    pub snippet: String,
    pub token_count: u32,
    pub char_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_path: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub version: ChunkVersion,
}

impl ChunkSnapshot {
    /// Builds a snippet truncated to `max_len` chars, as used by both
    /// fast chunking and deep VLM chunk construction.
    #[must_use]
    pub fn snippet_of(text: &str, max_len: usize) -> String {
        if text.len() <= max_len {
            text.to_string()
        } else {
            let mut end = max_len;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text[..end].to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_name_and_extension_from_path() {
        let record = FileRecord::new("f1", "/docs/report.PDF", FileKind::Document);
        assert_eq!(record.name, "report.PDF");
        assert_eq!(record.extension, "pdf");
    }

    #[test]
    fn deep_consistency_holds_before_fast_completes() {
        let mut record = FileRecord::new("f1", "report.pdf", FileKind::Document);
        assert!(record.deep_is_consistent());
        record.deep_stage = STAGE_TEXT_EXTRACTED;
        assert!(!record.deep_is_consistent());
        record.fast_stage = STAGE_EMBEDDED;
        assert!(record.deep_is_consistent());
    }

    #[test]
    fn skipped_deep_is_always_consistent() {
        let mut record = FileRecord::new("f1", "notes.txt", FileKind::Text);
        record.deep_stage = STAGE_SKIPPED;
        assert!(record.deep_is_consistent());
    }
}
