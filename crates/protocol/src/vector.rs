use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A dense vector plus the metadata subset the vector store filters on
/// server-side. `doc_id` mirrors the owning chunk's `chunk_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDocument {
    pub doc_id: String,
    pub vector: Vec<f32>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl VectorDocument {
    #[must_use]
    pub fn new(doc_id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            doc_id: doc_id.into(),
            vector,
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Server-side metadata filter for `VectorStore::search`/`delete`.
///
/// Supports equality on `file_id`, `version`, `privacy_level`, and
/// set-membership of `file_id` (§4.3).
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub file_id: Option<String>,
    pub file_ids: Option<Vec<String>>,
    pub version: Option<String>,
    pub privacy_level: Option<String>,
}

impl VectorFilter {
    #[must_use]
    pub fn matches(&self, metadata: &HashMap<String, serde_json::Value>) -> bool {
        if let Some(ref file_id) = self.file_id {
            if metadata.get("file_id").and_then(|v| v.as_str()) != Some(file_id.as_str()) {
                return false;
            }
        }
        if let Some(ref file_ids) = self.file_ids {
            let Some(candidate) = metadata.get("file_id").and_then(|v| v.as_str()) else {
                return false;
            };
            if !file_ids.iter().any(|id| id == candidate) {
                return false;
            }
        }
        if let Some(ref version) = self.version {
            if metadata.get("version").and_then(|v| v.as_str()) != Some(version.as_str()) {
                return false;
            }
        }
        if let Some(ref privacy_level) = self.privacy_level {
            if metadata.get("privacy_level").and_then(|v| v.as_str()) != Some(privacy_level.as_str())
            {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_filter_matches_everything() {
        let filter = VectorFilter::default();
        assert!(filter.matches(&HashMap::new()));
    }

    #[test]
    fn file_ids_filter_rejects_missing_metadata() {
        let filter = VectorFilter {
            file_ids: Some(vec!["a".into()]),
            ..Default::default()
        };
        assert!(!filter.matches(&HashMap::new()));
    }

    #[test]
    fn combined_filter_requires_all_fields() {
        let filter = VectorFilter {
            version: Some("deep".into()),
            privacy_level: Some("public".into()),
            ..Default::default()
        };
        let mut meta = HashMap::new();
        meta.insert("version".to_string(), json!("deep"));
        meta.insert("privacy_level".to_string(), json!("private"));
        assert!(!filter.matches(&meta));
    }
}
