use crate::error::{IndexerError, Result};
use crate::state_manager::{ActiveStageUpdate, StateManager};
use chrono::Utc;
use context_chunker::Chunker;
use context_clients::EmbeddingClient;
use context_content::{ContentRouter, IndexingMode};
use context_protocol::{
    ChunkVersion, FileRecord, Settings, VectorDocument, STAGE_EMBEDDED, STAGE_FAILED,
    STAGE_TEXT_EXTRACTED,
};
use context_storage::Storage;
use context_vector_store::VectorStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Runs the fast indexing round for one file (§4.4 C4): parse, chunk,
/// persist, embed, upsert. Every exit path — success, empty text, or
/// failure — resets the active-stage marker before returning.
pub struct FastProcessor {
    storage: Arc<Storage>,
    router: Arc<ContentRouter>,
    chunker: Arc<Chunker>,
    vector_store: Arc<dyn VectorStore>,
    embedding_client: Arc<dyn EmbeddingClient>,
    state: Arc<StateManager>,
}

impl FastProcessor {
    #[must_use]
    pub fn new(
        storage: Arc<Storage>,
        router: Arc<ContentRouter>,
        chunker: Arc<Chunker>,
        vector_store: Arc<dyn VectorStore>,
        embedding_client: Arc<dyn EmbeddingClient>,
        state: Arc<StateManager>,
    ) -> Self {
        Self {
            storage,
            router,
            chunker,
            vector_store,
            embedding_client,
            state,
        }
    }

    pub async fn process(&self, file_id: &str, settings: &Settings) -> Result<()> {
        let result = self.process_inner(file_id, settings).await;
        if result.is_err() {
            let _ = self.storage.update_fast_stage(file_id, STAGE_FAILED, None, false);
        }
        self.state.reset_active_state();
        result
    }

    async fn process_inner(&self, file_id: &str, settings: &Settings) -> Result<()> {
        let file = self
            .storage
            .require_file(file_id)
            .map_err(|_| IndexerError::FileNotFound(file_id.to_string()))?;

        if file.fast_stage >= STAGE_EMBEDDED {
            return Ok(());
        }
        if !std::path::Path::new(&file.path).exists() {
            self.storage
                .update_fast_stage(file_id, STAGE_FAILED, None, false)?;
            return Err(IndexerError::FileNotFound(file.path));
        }

        self.state.set_active_stage(ActiveStageUpdate::new(
            "fast_parse",
            format!("parsing {}", file.name),
        ));
        let router = self.router.clone();
        let path = std::path::PathBuf::from(&file.path);
        let parsed =
            tokio::task::spawn_blocking(move || router.parse(&path, IndexingMode::Fast)).await??;

        self.storage.update_parsed_metadata(
            file_id,
            parsed.page_count,
            parsed.preview_image.as_deref(),
        )?;

        if parsed.is_empty_text() {
            let now = Utc::now();
            self.storage
                .replace_chunks(file_id, ChunkVersion::Fast, &[])?;
            self.storage
                .update_fast_stage(file_id, STAGE_TEXT_EXTRACTED, Some(now), false)?;
            self.storage
                .update_fast_stage(file_id, STAGE_EMBEDDED, Some(now), true)?;
            return Ok(());
        }

        self.state.set_active_stage(ActiveStageUpdate::new(
            "fast_chunk",
            format!("chunking {}", file.name),
        ));
        let chunks = self
            .chunker
            .chunk_text(file_id, &parsed.text, ChunkVersion::Fast)?;

        self.storage
            .replace_chunks(file_id, ChunkVersion::Fast, &chunks)?;
        self.storage
            .update_fast_stage(file_id, STAGE_TEXT_EXTRACTED, Some(Utc::now()), false)?;

        self.state.set_active_stage(ActiveStageUpdate::new(
            "fast_embed",
            format!("embedding {}", file.name),
        ));
        self.embed_and_upsert(&file, &chunks, settings).await?;

        self.storage
            .update_fast_stage(file_id, STAGE_EMBEDDED, Some(Utc::now()), true)?;
        Ok(())
    }

    async fn embed_and_upsert(
        &self,
        file: &FileRecord,
        chunks: &[context_protocol::ChunkSnapshot],
        settings: &Settings,
    ) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let batch_size = settings.embed_batch_size.max(1);
        let total_batches = chunks.len().div_ceil(batch_size);

        for (batch_index, batch) in chunks.chunks(batch_size).enumerate() {
            self.state.set_active_stage(
                ActiveStageUpdate::new("fast_embed", format!("embedding {}", file.name))
                    .with_step(batch_index as u64 + 1, total_batches as u64),
            );

            let texts: Vec<String> = batch
                .iter()
                .map(|chunk| truncate_chars(&chunk.text, settings.embed_max_chars))
                .collect();
            let vectors = self.embedding_client.encode(&texts).await?;

            let documents = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| build_vector_document(file, chunk, vector))
                .collect();
            self.vector_store.upsert(documents).await?;

            if settings.embed_batch_delay_ms > 0 && batch_index + 1 < total_batches {
                tokio::time::sleep(Duration::from_millis(settings.embed_batch_delay_ms)).await;
            }
        }

        self.vector_store.flush().await?;
        Ok(())
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

pub(crate) fn build_vector_document(
    file: &FileRecord,
    chunk: &context_protocol::ChunkSnapshot,
    vector: Vec<f32>,
) -> VectorDocument {
    let mut doc = VectorDocument::new(chunk.chunk_id.clone(), vector)
        .with_metadata("chunk_id", json!(chunk.chunk_id))
        .with_metadata("file_id", json!(file.file_id))
        .with_metadata("file_name", json!(file.name))
        .with_metadata("path", json!(file.path))
        .with_metadata("extension", json!(file.extension))
        .with_metadata("kind", json!(file.kind))
        .with_metadata("snippet", json!(chunk.snippet))
        .with_metadata("version", json!(chunk.version.as_str()))
        .with_metadata("privacy_level", json!(file.privacy_level.as_str()));
    if let Some(ref folder_id) = file.folder_id {
        doc = doc.with_metadata("folder_id", json!(folder_id));
    }
    if let Some(ref section_path) = chunk.section_path {
        if let Some(page_number) = section_path
            .strip_prefix("page_")
            .and_then(|n| n.parse::<u32>().ok())
        {
            doc = doc
                .with_metadata("page_number", json!(page_number))
                .with_metadata("page_numbers", json!([page_number]));
        }
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_chunker::ChunkerConfig;
    use context_content::ContentRouter;
    use context_protocol::FileKind;
    use context_vector_store::InMemoryVectorStore;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct StubEmbeddingClient {
        dim: usize,
    }

    #[async_trait::async_trait]
    impl EmbeddingClient for StubEmbeddingClient {
        async fn encode(&self, texts: &[String]) -> context_clients::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0; self.dim]).collect())
        }
    }

    fn settings() -> Settings {
        Settings {
            embed_batch_size: 2,
            embed_batch_delay_ms: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_text_file_reaches_stage_two_with_no_chunks() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "   ").unwrap();
        let record = FileRecord::new("f1", tmp.path().to_str().unwrap(), FileKind::Text);
        storage.upsert_file(&record).unwrap();

        let processor = FastProcessor::new(
            storage.clone(),
            Arc::new(ContentRouter::with_defaults()),
            Arc::new(Chunker::new(ChunkerConfig::new(10, 2).unwrap())),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(StubEmbeddingClient { dim: 4 }),
            Arc::new(StateManager::new()),
        );
        processor.process("f1", &settings()).await.unwrap();

        let updated = storage.get_file("f1").unwrap().unwrap();
        assert_eq!(updated.fast_stage, STAGE_EMBEDDED);
        assert!(storage
            .get_chunks("f1", ChunkVersion::Fast)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn missing_path_marks_stage_failed() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let record = FileRecord::new("f1", "/nonexistent/path.txt", FileKind::Text);
        storage.upsert_file(&record).unwrap();

        let processor = FastProcessor::new(
            storage.clone(),
            Arc::new(ContentRouter::with_defaults()),
            Arc::new(Chunker::new(ChunkerConfig::new(10, 2).unwrap())),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(StubEmbeddingClient { dim: 4 }),
            Arc::new(StateManager::new()),
        );
        let result = processor.process("f1", &settings()).await;
        assert!(result.is_err());
        let updated = storage.get_file("f1").unwrap().unwrap();
        assert_eq!(updated.fast_stage, STAGE_FAILED);
    }

    #[tokio::test]
    async fn non_empty_file_embeds_and_upserts_vectors() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let mut tmp = NamedTempFile::new().unwrap();
        let body = (0..40)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(tmp, "{body}").unwrap();
        let record = FileRecord::new("f1", tmp.path().to_str().unwrap(), FileKind::Text);
        storage.upsert_file(&record).unwrap();

        let vector_store = Arc::new(InMemoryVectorStore::new());
        let processor = FastProcessor::new(
            storage.clone(),
            Arc::new(ContentRouter::with_defaults()),
            Arc::new(Chunker::new(ChunkerConfig::new(10, 2).unwrap())),
            vector_store.clone(),
            Arc::new(StubEmbeddingClient { dim: 4 }),
            Arc::new(StateManager::new()),
        );
        processor.process("f1", &settings()).await.unwrap();

        let updated = storage.get_file("f1").unwrap().unwrap();
        assert_eq!(updated.fast_stage, STAGE_EMBEDDED);
        let chunks = storage.get_chunks("f1", ChunkVersion::Fast).unwrap();
        assert!(!chunks.is_empty());

        let filter = context_protocol::VectorFilter {
            file_id: Some("f1".to_string()),
            ..Default::default()
        };
        let hits = vector_store
            .search(&[1.0, 1.0, 1.0, 1.0], 10, &filter)
            .await
            .unwrap();
        assert_eq!(hits.len(), chunks.len());
    }
}
