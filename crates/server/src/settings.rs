use crate::error::{Result, ServerError};
use crate::state::AppState;
use arc_swap::ArcSwap;
use axum::extract::State;
use axum::Json;
use context_protocol::{IndexingMode, PdfMode, Settings};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Holds the mutable configuration snapshot behind an atomic swap (§9),
/// and persists it back to the TOML file on every update
/// (`settings.save_to_file()` in the original implementation).
pub struct SettingsStore {
    current: ArcSwap<Settings>,
    path: PathBuf,
}

impl SettingsStore {
    /// Loads `path` if it exists and parses as valid TOML, otherwise
    /// starts from [`Settings::default`]. A malformed file is a
    /// configuration error, not a silent fallback (§7).
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|err| ServerError::BadRequest(format!("reading {}: {err}", path.display())))?;
            toml::from_str(&raw)
                .map_err(|err| ServerError::BadRequest(format!("parsing {}: {err}", path.display())))?
        } else {
            Settings::default()
        };
        Ok(Self { current: ArcSwap::from_pointee(settings), path })
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<Settings> {
        self.current.load_full()
    }

    /// Applies `patch` on top of the current snapshot, publishes the
    /// result, and persists it to `self.path`.
    pub fn update(&self, patch: SettingsPatch) -> Result<Arc<Settings>> {
        let current = self.current.load();
        let mut next = (**current).clone();
        patch.apply(&mut next);
        self.current.store(Arc::new(next));
        self.persist()?;
        Ok(self.current.load_full())
    }

    fn persist(&self) -> Result<()> {
        let snapshot = self.current.load();
        let raw = toml::to_string_pretty(&**snapshot)
            .map_err(|err| ServerError::BadRequest(format!("serializing settings: {err}")))?;
        if let Some(parent) = Path::new(&self.path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| ServerError::BadRequest(format!("creating {}: {err}", parent.display())))?;
        }
        std::fs::write(&self.path, raw)
            .map_err(|err| ServerError::BadRequest(format!("writing {}: {err}", self.path.display())))?;
        Ok(())
    }
}

/// `PATCH /settings/` body: every field optional, only present fields
/// are applied (mirrors the original's `SettingsUpdate`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub vision_max_pixels: Option<u32>,
    pub video_max_pixels: Option<u32>,
    pub embed_batch_size: Option<usize>,
    pub embed_batch_delay_ms: Option<u64>,
    pub vision_batch_delay_ms: Option<u64>,
    pub search_result_limit: Option<usize>,
    pub qa_context_limit: Option<usize>,
    pub max_snippet_length: Option<usize>,
    pub summary_max_tokens: Option<u32>,
    pub pdf_one_chunk_per_page: Option<bool>,
    pub rag_chunk_size: Option<usize>,
    pub rag_chunk_overlap: Option<usize>,
    pub default_indexing_mode: Option<IndexingMode>,
    pub pdf_mode: Option<PdfMode>,
    pub pdf_fast_allow_vision_fallback: Option<bool>,
}

impl SettingsPatch {
    fn apply(self, settings: &mut Settings) {
        if let Some(v) = self.vision_max_pixels {
            settings.vision_max_pixels = v;
        }
        if let Some(v) = self.video_max_pixels {
            settings.video_max_pixels = v;
        }
        if let Some(v) = self.embed_batch_size {
            settings.embed_batch_size = v;
        }
        if let Some(v) = self.embed_batch_delay_ms {
            settings.embed_batch_delay_ms = v;
        }
        if let Some(v) = self.vision_batch_delay_ms {
            settings.vision_batch_delay_ms = v;
        }
        if let Some(v) = self.search_result_limit {
            settings.search_result_limit = v;
        }
        if let Some(v) = self.qa_context_limit {
            settings.qa_context_limit = v;
        }
        if let Some(v) = self.max_snippet_length {
            settings.max_snippet_length = v;
        }
        if let Some(v) = self.summary_max_tokens {
            settings.summary_max_tokens = v;
        }
        if let Some(v) = self.pdf_one_chunk_per_page {
            settings.pdf_one_chunk_per_page = v;
        }
        if let Some(v) = self.rag_chunk_size {
            settings.rag_chunk_size = v;
        }
        if let Some(v) = self.rag_chunk_overlap {
            settings.rag_chunk_overlap = v;
        }
        if let Some(v) = self.default_indexing_mode {
            settings.default_indexing_mode = v;
        }
        if let Some(v) = self.pdf_mode {
            settings.pdf_mode = v;
        }
        if let Some(v) = self.pdf_fast_allow_vision_fallback {
            settings.pdf_fast_allow_vision_fallback = v;
        }
    }
}

pub async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json((*state.settings.snapshot()).clone())
}

pub async fn patch_settings(
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<Settings>> {
    let updated = state.settings.update(patch)?;
    Ok(Json((*updated).clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_starts_from_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(dir.path().join("settings.toml")).unwrap();
        assert_eq!(store.snapshot().search_result_limit, Settings::default().search_result_limit);
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let store = SettingsStore::load(&path).unwrap();
        store
            .update(SettingsPatch { embed_batch_size: Some(4), ..Default::default() })
            .unwrap();
        assert_eq!(store.snapshot().embed_batch_size, 4);

        let reloaded = SettingsStore::load(&path).unwrap();
        assert_eq!(reloaded.snapshot().embed_batch_size, 4);
    }

    #[test]
    fn partial_patch_only_touches_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(dir.path().join("settings.toml")).unwrap();
        store
            .update(SettingsPatch { max_snippet_length: Some(128), ..Default::default() })
            .unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.max_snippet_length, 128);
        assert_eq!(snapshot.rag_chunk_size, Settings::default().rag_chunk_size);
    }
}
