use crate::error::{IndexerError, Result};
use crate::fast::build_vector_document;
use crate::prompts;
use crate::state_manager::{ActiveStageUpdate, StateManager};
use chrono::Utc;
use context_clients::{EmbeddingClient, VisionClient};
use context_content::{ContentRouter, IndexingMode};
use context_protocol::{
    ChunkSnapshot, ChunkVersion, FileKind, FileRecord, Settings, STAGE_EMBEDDED, STAGE_FAILED,
    STAGE_SKIPPED, STAGE_TEXT_EXTRACTED,
};
use context_storage::Storage;
use context_vector_store::VectorStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Runs the deep (VLM-backed) indexing round for one file (§4.5 C5).
/// Text extraction and embedding happen together since VLM calls already
/// dominate the cost of the round.
pub struct DeepProcessor {
    storage: Arc<Storage>,
    router: Arc<ContentRouter>,
    vector_store: Arc<dyn VectorStore>,
    embedding_client: Arc<dyn EmbeddingClient>,
    vision_client: Arc<dyn VisionClient>,
    state: Arc<StateManager>,
}

impl DeepProcessor {
    #[must_use]
    pub fn new(
        storage: Arc<Storage>,
        router: Arc<ContentRouter>,
        vector_store: Arc<dyn VectorStore>,
        embedding_client: Arc<dyn EmbeddingClient>,
        vision_client: Arc<dyn VisionClient>,
        state: Arc<StateManager>,
    ) -> Self {
        Self {
            storage,
            router,
            vector_store,
            embedding_client,
            vision_client,
            state,
        }
    }

    pub async fn process(&self, file_id: &str, settings: &Settings) -> Result<()> {
        let result = self.process_inner(file_id, settings).await;
        if result.is_err() {
            let _ = self.storage.update_deep_stage(file_id, STAGE_FAILED, None, false);
        }
        self.state.reset_active_state();
        result
    }

    async fn process_inner(&self, file_id: &str, settings: &Settings) -> Result<()> {
        let file = self
            .storage
            .require_file(file_id)
            .map_err(|_| IndexerError::FileNotFound(file_id.to_string()))?;

        if file.fast_stage < STAGE_EMBEDDED {
            log::warn!("file {file_id} hasn't completed the fast round yet, skipping deep");
            return Ok(());
        }
        if file.deep_stage >= STAGE_EMBEDDED || file.deep_stage == STAGE_SKIPPED {
            return Ok(());
        }
        if !should_process_deep(&file) {
            self.storage
                .update_deep_stage(file_id, STAGE_SKIPPED, None, false)?;
            return Ok(());
        }
        if !std::path::Path::new(&file.path).exists() {
            self.storage
                .update_deep_stage(file_id, STAGE_FAILED, None, false)?;
            return Err(IndexerError::FileNotFound(file.path));
        }

        self.state.set_active_stage(
            ActiveStageUpdate::new("deep_vision", format!("deep processing {}", file.name))
                .with_progress(0.0),
        );

        let mut chunks = match file.kind {
            FileKind::Image => {
                let text = self.process_image(&file).await?;
                text.map(|t| build_full_chunk(&file, &t)).unwrap_or_default()
            }
            FileKind::Document if file.extension == "pdf" => {
                self.process_pdf(&file, settings).await?
            }
            FileKind::Presentation => {
                let text = self.process_presentation(&file).await?;
                text.map(|t| build_full_chunk(&file, &t)).unwrap_or_default()
            }
            _ => Vec::new(),
        };

        if chunks.is_empty() {
            let now = Utc::now();
            self.storage
                .update_deep_stage(file_id, STAGE_TEXT_EXTRACTED, Some(now), false)?;
            self.storage
                .update_deep_stage(file_id, STAGE_EMBEDDED, Some(now), true)?;
            return Ok(());
        }

        for chunk in &mut chunks {
            chunk.version = ChunkVersion::Deep;
        }

        self.storage
            .replace_chunks(file_id, ChunkVersion::Deep, &chunks)?;
        self.storage
            .update_deep_stage(file_id, STAGE_TEXT_EXTRACTED, Some(Utc::now()), false)?;

        self.state.set_active_stage(
            ActiveStageUpdate::new("deep_embed", format!("embedding {} deep chunks", chunks.len()))
                .with_progress(50.0),
        );
        let vectors = self.embed_chunks(&chunks, settings).await?;

        let documents: Vec<_> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| build_vector_document(&file, chunk, vector))
            .collect();
        self.vector_store.upsert(documents.clone()).await?;
        self.vector_store.flush().await?;

        let mut updated = file.clone();
        updated.metadata.insert(
            "vector_chunks_deep".to_string(),
            json!(documents.iter().map(|d| d.doc_id.clone()).collect::<Vec<_>>()),
        );
        updated
            .metadata
            .insert("chunk_count_deep".to_string(), json!(chunks.len()));
        updated
            .metadata
            .insert("deep_processed".to_string(), json!(true));
        let now = Utc::now();
        updated.deep_stage = STAGE_EMBEDDED;
        updated.deep_text_at = Some(now);
        updated.deep_embed_at = Some(now);
        self.storage.upsert_file(&updated)?;

        Ok(())
    }

    async fn process_image(&self, file: &FileRecord) -> Result<Option<String>> {
        let image_bytes = match &file.preview_image {
            Some(bytes) => bytes.clone(),
            None => match std::fs::read(&file.path) {
                Ok(bytes) => bytes,
                Err(_) => return Ok(None),
            },
        };
        match self
            .vision_client
            .describe_image(&image_bytes, prompts::IMAGE_PROMPT)
            .await
        {
            Ok(text) => Ok(Some(text)),
            Err(err) => {
                log::warn!("VLM processing failed for image {}: {err}", file.path);
                Ok(None)
            }
        }
    }

    async fn process_presentation(&self, file: &FileRecord) -> Result<Option<String>> {
        let Some(ref preview) = file.preview_image else {
            return Ok(None);
        };
        match self
            .vision_client
            .describe_image(preview, prompts::PRESENTATION_SLIDE_PROMPT)
            .await
        {
            Ok(text) => Ok(Some(text)),
            Err(err) => {
                log::warn!("VLM processing failed for presentation {}: {err}", file.path);
                Ok(None)
            }
        }
    }

    async fn process_pdf(
        &self,
        file: &FileRecord,
        settings: &Settings,
    ) -> Result<Vec<ChunkSnapshot>> {
        let router = self.router.clone();
        let path = std::path::PathBuf::from(&file.path);
        let parsed = match tokio::task::spawn_blocking(move || router.parse(&path, IndexingMode::Deep)).await {
            Ok(Ok(parsed)) => parsed,
            Ok(Err(err)) => {
                log::warn!("failed to parse PDF {} for deep processing: {err}", file.path);
                return Ok(Vec::new());
            }
            Err(err) => {
                log::warn!("parse task panicked for PDF {}: {err}", file.path);
                return Ok(Vec::new());
            }
        };

        let pages = parsed.ordered_pages();
        if pages.is_empty() {
            return Ok(Vec::new());
        }

        let total_pages = pages.len();
        let now = Utc::now();
        let mut chunks = Vec::new();

        for (index, (page_number, image_bytes)) in pages.into_iter().enumerate() {
            self.state.set_active_stage(
                ActiveStageUpdate::new(
                    "deep_vision",
                    format!("VLM processing page {}/{total_pages}", index + 1),
                )
                .with_step(index as u64 + 1, total_pages as u64)
                .with_progress((index as f32 / total_pages.max(1) as f32) * 50.0),
            );

            if settings.vision_batch_delay_ms > 0 && index > 0 {
                tokio::time::sleep(Duration::from_millis(settings.vision_batch_delay_ms)).await;
            }

            let described = match self
                .vision_client
                .describe_image(image_bytes, prompts::PDF_PAGE_PROMPT)
                .await
            {
                Ok(text) => text,
                Err(err) => {
                    log::warn!(
                        "VLM failed for page {page_number} of {}: {err}",
                        file.path
                    );
                    continue;
                }
            };

            let cleaned = strip_code_fence(described.trim());
            if cleaned.is_empty() {
                continue;
            }

            let chunk_id = format!("{}::deep::page_{page_number}", file.file_id);
            let mut metadata = std::collections::HashMap::new();
            metadata.insert("page_number".to_string(), json!(page_number));
            metadata.insert("page_numbers".to_string(), json!([page_number]));
            metadata.insert("source".to_string(), json!("vlm"));

            chunks.push(ChunkSnapshot {
                chunk_id,
                file_id: file.file_id.clone(),
                ordinal: page_number.saturating_sub(1),
                snippet: ChunkSnapshot::snippet_of(&cleaned, 400),
                token_count: ((cleaned.chars().count() / 4).max(1)) as u32,
                char_count: cleaned.chars().count() as u32,
                section_path: Some(format!("page_{page_number}")),
                metadata,
                created_at: now,
                version: ChunkVersion::Deep,
                text: cleaned,
            });
        }

        Ok(chunks)
    }

    async fn embed_chunks(
        &self,
        chunks: &[ChunkSnapshot],
        settings: &Settings,
    ) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks
            .iter()
            .filter(|c| !c.text.trim().is_empty())
            .map(|c| truncate_chars(c.text.trim(), settings.embed_max_chars))
            .collect();
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = settings.embed_batch_size.max(1);
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            let encoded = self.embedding_client.encode(batch).await?;
            vectors.extend(encoded);
        }
        Ok(vectors)
    }
}

/// Mirrors the original implementation's eligibility rule: images always
/// benefit from VLM, PDFs only when page renders exist, presentations
/// always, everything else (text, audio, video) is skipped.
fn should_process_deep(file: &FileRecord) -> bool {
    match file.kind {
        FileKind::Image => true,
        FileKind::Document if file.extension == "pdf" => {
            file.preview_image.is_some() || file.page_count.unwrap_or(0) > 0
        }
        FileKind::Presentation => true,
        _ => false,
    }
}

fn build_full_chunk(file: &FileRecord, text: &str) -> Vec<ChunkSnapshot> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let text = text.trim().to_string();
    let mut metadata = std::collections::HashMap::new();
    metadata.insert("source".to_string(), json!("vlm"));
    vec![ChunkSnapshot {
        chunk_id: format!("{}::deep::full", file.file_id),
        file_id: file.file_id.clone(),
        ordinal: 0,
        snippet: ChunkSnapshot::snippet_of(&text, 400),
        token_count: ((text.chars().count() / 4).max(1)) as u32,
        char_count: text.chars().count() as u32,
        section_path: None,
        metadata,
        created_at: Utc::now(),
        version: ChunkVersion::Deep,
        text,
    }]
}

/// Strips a leading/trailing Markdown code fence (```lang ... ```), a
/// formatting tic some VLM backends wrap transcriptions in.
fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let without_open = trimmed
        .splitn(2, '\n')
        .nth(1)
        .unwrap_or(trimmed)
        .trim_end();
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
        .to_string()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(kind: FileKind, extension: &str) -> FileRecord {
        let mut record = FileRecord::new("f1", format!("file.{extension}"), kind);
        record.extension = extension.to_string();
        record
    }

    #[test]
    fn images_always_eligible() {
        assert!(should_process_deep(&file(FileKind::Image, "png")));
    }

    #[test]
    fn pdf_without_pages_or_preview_is_skipped() {
        assert!(!should_process_deep(&file(FileKind::Document, "pdf")));
    }

    #[test]
    fn pdf_with_page_count_is_eligible() {
        let mut record = file(FileKind::Document, "pdf");
        record.page_count = Some(3);
        assert!(should_process_deep(&record));
    }

    #[test]
    fn text_documents_are_skipped() {
        assert!(!should_process_deep(&file(FileKind::Document, "txt")));
    }

    #[test]
    fn presentations_are_always_eligible() {
        assert!(should_process_deep(&file(FileKind::Presentation, "pptx")));
    }

    #[test]
    fn audio_and_video_are_skipped() {
        assert!(!should_process_deep(&file(FileKind::Audio, "mp3")));
        assert!(!should_process_deep(&file(FileKind::Video, "mp4")));
    }

    #[test]
    fn code_fence_is_stripped() {
        let wrapped = "```markdown\nhello world\n```";
        assert_eq!(strip_code_fence(wrapped), "hello world");
    }

    #[test]
    fn plain_text_is_unaffected_by_fence_stripping() {
        assert_eq!(strip_code_fence("hello world"), "hello world");
    }

    #[test]
    fn full_chunk_carries_vlm_source_metadata() {
        let record = file(FileKind::Image, "png");
        let chunks = build_full_chunk(&record, "a description");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "f1::deep::full");
        assert_eq!(chunks[0].metadata.get("source").unwrap(), "vlm");
    }
}
