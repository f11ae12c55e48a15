use serde::{Deserialize, Serialize};

/// Mutable process-wide configuration snapshot (§6, §9 "Global settings
/// object"). Consumers take a snapshot (clone) at the start of each
/// request or processing step; the settings PATCH handler swaps the
/// shared snapshot atomically (last-writer-wins per field, §5).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub vision_max_pixels: u32,
    pub video_max_pixels: u32,
    pub embed_batch_size: usize,
    pub embed_batch_delay_ms: u64,
    pub embed_max_chars: usize,
    pub vision_batch_delay_ms: u64,
    pub search_result_limit: usize,
    pub qa_context_limit: usize,
    pub max_snippet_length: usize,
    pub summary_max_tokens: u32,
    pub pdf_one_chunk_per_page: bool,
    pub rag_chunk_size: usize,
    pub rag_chunk_overlap: usize,
    pub default_indexing_mode: IndexingMode,
    pub pdf_mode: PdfMode,
    /// Explicit flag for the §9 open question: the PDF fast path falls
    /// back to the vision parser when text extraction yields nothing.
    pub pdf_fast_allow_vision_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingMode {
    Fast,
    Deep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdfMode {
    Text,
    Vision,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vision_max_pixels: 1_600_000,
            video_max_pixels: 1_600_000,
            embed_batch_size: 16,
            embed_batch_delay_ms: 0,
            embed_max_chars: 8_192,
            vision_batch_delay_ms: 250,
            search_result_limit: 8,
            qa_context_limit: 8,
            max_snippet_length: 400,
            summary_max_tokens: 768,
            pdf_one_chunk_per_page: true,
            rag_chunk_size: 512,
            rag_chunk_overlap: 64,
            default_indexing_mode: IndexingMode::Fast,
            pdf_mode: PdfMode::Text,
            pdf_fast_allow_vision_fallback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, back);
    }

    #[test]
    fn partial_patch_keeps_other_fields() {
        let mut settings = Settings::default();
        settings.embed_batch_size = 4;
        assert_eq!(settings.max_snippet_length, 400);
    }
}
