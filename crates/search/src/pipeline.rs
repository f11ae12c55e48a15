use crate::fusion::RrfFusion;
use crate::synthesis::SynthesisInput;
use crate::util::parse_json_array;
use crate::{Result, SearchError};
use context_clients::{ChatMessage, EmbeddingClient, LlmClient, RerankClient};
use context_protocol::{
    ChunkSnapshot, SearchHit, StreamEvent, ThinkingStep, ThinkingStepStatus,
};
use context_storage::Storage;
use context_vector_store::{VectorFilter, VectorStore};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::Sender;

/// One per-chunk verification verdict (§4.7.4 step 4).
#[derive(Debug, Clone, Deserialize)]
struct VerifyResult {
    has_answer: bool,
    confidence: f32,
    extracted_content: String,
    source_ref: String,
}

const VERIFY_SYSTEM_PROMPT: &str = "For each numbered source below, decide whether it helps \
answer the question. Reply with a strict JSON array, one object per source in the same order: \
[{\"has_answer\": bool, \"confidence\": 0.0-1.0, \"extracted_content\": string, \"source_ref\": \
string}]. \"extracted_content\" should quote or closely paraphrase only the relevant part of the \
source. \"source_ref\" should name the source (its file path). If a source is irrelevant, set \
has_answer to false and confidence to 0.";

const MIN_VERIFY_CONFIDENCE: f32 = 0.5;

/// Outcome of running the standard retrieval → rerank → verify flow once.
pub struct PipelineOutcome {
    pub hits: Vec<SearchHit>,
    pub verified: Vec<SynthesisInput>,
}

/// Retrieval, fusion, reranking and verification for one query (§4.7.4).
/// [`crate::multipath`] runs this once per sub-query.
pub struct StandardPipeline {
    storage: Arc<Storage>,
    vector_store: Arc<dyn VectorStore>,
    embedding_client: Arc<dyn EmbeddingClient>,
    rerank_client: Arc<dyn RerankClient>,
    llm_client: Arc<dyn LlmClient>,
    verify_batch_size: usize,
}

impl StandardPipeline {
    #[must_use]
    pub fn new(
        storage: Arc<Storage>,
        vector_store: Arc<dyn VectorStore>,
        embedding_client: Arc<dyn EmbeddingClient>,
        rerank_client: Arc<dyn RerankClient>,
        llm_client: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            storage,
            vector_store,
            embedding_client,
            rerank_client,
            llm_client,
            verify_batch_size: 5,
        }
    }

    /// Retrieval + fusion + reranking only, no verification or
    /// synthesis. Backs the plain `POST /search` endpoint, which wants
    /// ranked hits without paying for an LLM verification pass.
    pub async fn search_only(
        &self,
        query: &str,
        limit: usize,
        allowlist: Option<&[String]>,
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let scored = self.retrieve_and_rerank(query, limit, allowlist, None, None).await?;
        Ok(scored
            .into_iter()
            .map(|(chunk, score)| {
                let path = self.resolve_path(&chunk.file_id);
                to_search_hit(&chunk, score, None, path)
            })
            .collect())
    }

    pub async fn execute(
        &self,
        query: &str,
        limit: usize,
        allowlist: Option<&[String]>,
        sub_query_index: Option<usize>,
        events: &Sender<StreamEvent>,
        step_prefix: &str,
    ) -> Result<PipelineOutcome> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let retrieve_started = Instant::now();
        let mut step = 0usize;
        let scored = self
            .retrieve_and_rerank(query, limit, allowlist, Some(events), Some(step_prefix))
            .await?;
        step += 2;

        if scored.is_empty() {
            return Ok(PipelineOutcome { hits: Vec::new(), verified: Vec::new() });
        }

        let mut next_id = || {
            step += 1;
            format!("{step_prefix}_{step}")
        };
        let verify_id = next_id();
        emit_step(events, &verify_id, "Verifying sources", ThinkingStepStatus::Running, None).await;
        let verdicts = self.verify_batches(query, &scored).await?;
        emit_step(
            events,
            &verify_id,
            "Verifying sources",
            ThinkingStepStatus::Complete,
            Some(format!(
                "{} of {} sources answered the question",
                verdicts.iter().filter(|v| v.has_answer).count(),
                verdicts.len()
            )),
        )
        .await;

        let mut path_cache: std::collections::HashMap<String, String> = std::collections::HashMap::new();
        let hits: Vec<SearchHit> = scored
            .iter()
            .map(|(chunk, score)| {
                let path = path_cache
                    .entry(chunk.file_id.clone())
                    .or_insert_with(|| self.resolve_path(&chunk.file_id))
                    .clone();
                to_search_hit(chunk, *score, sub_query_index, path)
            })
            .collect();
        let _ = events.send(StreamEvent::Hits(hits.clone())).await;

        let verified = scored
            .iter()
            .zip(verdicts.iter())
            .enumerate()
            .filter(|(_, (_, verdict))| {
                verdict.has_answer && verdict.confidence >= MIN_VERIFY_CONFIDENCE
            })
            .map(|(index, ((_, _), verdict))| SynthesisInput {
                index,
                source: verdict.source_ref.clone(),
                content: verdict.extracted_content.clone(),
                confidence: verdict.confidence,
            })
            .collect();

        log::debug!(
            "standard pipeline finished in {:?} for query {query:?}",
            retrieve_started.elapsed()
        );

        Ok(PipelineOutcome { hits, verified })
    }

    /// Shared retrieval guts for [`Self::search_only`] and [`Self::execute`]:
    /// keyword + vector search, RRF fusion, and reranking down to
    /// `limit * 2` candidates. Emits thinking-step events only when a
    /// channel is supplied.
    async fn retrieve_and_rerank(
        &self,
        query: &str,
        limit: usize,
        allowlist: Option<&[String]>,
        events: Option<&Sender<StreamEvent>>,
        step_prefix: Option<&str>,
    ) -> Result<Vec<(ChunkSnapshot, f32)>> {
        let retrieve_id = format!("{}_1", step_prefix.unwrap_or("search"));
        if let Some(events) = events {
            emit_step(events, &retrieve_id, "Searching", ThinkingStepStatus::Running, None).await;
        }

        let top_k = limit.saturating_mul(4).max(limit);
        let keyword_hits = self.storage.keyword_search(query, top_k, allowlist)?;
        let query_vector = self
            .embedding_client
            .encode(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        let filter = VectorFilter {
            file_ids: allowlist.map(<[String]>::to_vec),
            ..VectorFilter::default()
        };
        let vector_hits = self.vector_store.search(&query_vector, top_k, &filter).await?;

        let fused = RrfFusion::default().fuse(&keyword_hits, &vector_hits);
        if let Some(events) = events {
            emit_step(
                events,
                &retrieve_id,
                "Searching",
                ThinkingStepStatus::Complete,
                Some(format!("{} candidates found", fused.len())),
            )
            .await;
        }

        if fused.is_empty() {
            return Ok(Vec::new());
        }

        let mut chunk_cache: std::collections::HashMap<String, ChunkSnapshot> =
            keyword_hits.into_iter().map(|hit| (hit.chunk.chunk_id.clone(), hit.chunk)).collect();
        let mut candidates = Vec::with_capacity(fused.len());
        for hit in &fused {
            if !chunk_cache.contains_key(&hit.chunk_id) {
                if let Some(chunk) = self.storage.get_chunk(&hit.chunk_id)? {
                    chunk_cache.insert(hit.chunk_id.clone(), chunk);
                }
            }
            if let Some(chunk) = chunk_cache.get(&hit.chunk_id) {
                candidates.push(chunk.clone());
            }
        }

        let rerank_id = format!("{}_2", step_prefix.unwrap_or("search"));
        if let Some(events) = events {
            emit_step(events, &rerank_id, "Reranking", ThinkingStepStatus::Running, None).await;
        }
        let passages: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let rerank_scores = self.rerank_client.rerank(query, &passages).await?;
        let mut scored: Vec<(ChunkSnapshot, f32)> =
            candidates.into_iter().zip(rerank_scores).collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit.saturating_mul(2).max(1));
        if let Some(events) = events {
            emit_step(
                events,
                &rerank_id,
                "Reranking",
                ThinkingStepStatus::Complete,
                Some(format!("kept top {}", scored.len())),
            )
            .await;
        }

        Ok(scored)
    }

    fn resolve_path(&self, file_id: &str) -> String {
        self.storage
            .get_file(file_id)
            .ok()
            .flatten()
            .map(|f| f.path)
            .unwrap_or_else(|| file_id.to_string())
    }

    async fn verify_batches(
        &self,
        query: &str,
        scored: &[(ChunkSnapshot, f32)],
    ) -> Result<Vec<VerifyResult>> {
        let mut results = Vec::with_capacity(scored.len());
        for batch in scored.chunks(self.verify_batch_size) {
            let mut prompt = format!("Question: {query}\n\nSources:\n");
            for (i, (chunk, _)) in batch.iter().enumerate() {
                prompt.push_str(&format!("[{}] ({})\n{}\n\n", i + 1, chunk.file_id, chunk.text));
            }
            let messages = vec![
                ChatMessage::new("system", VERIFY_SYSTEM_PROMPT),
                ChatMessage::new("user", prompt),
            ];
            let raw = self.llm_client.chat_complete(messages, 1024).await?;
            let parsed: Vec<VerifyResult> = parse_json_array(&raw).unwrap_or_else(|| {
                batch
                    .iter()
                    .map(|(chunk, _)| VerifyResult {
                        has_answer: false,
                        confidence: 0.0,
                        extracted_content: String::new(),
                        source_ref: chunk.file_id.clone(),
                    })
                    .collect()
            });
            results.extend(parsed);
        }
        results.resize_with(scored.len(), || VerifyResult {
            has_answer: false,
            confidence: 0.0,
            extracted_content: String::new(),
            source_ref: String::new(),
        });
        Ok(results)
    }
}

fn to_search_hit(
    chunk: &ChunkSnapshot,
    score: f32,
    sub_query_index: Option<usize>,
    path: String,
) -> SearchHit {
    let page_number = chunk
        .metadata
        .get("page_number")
        .and_then(serde_json::Value::as_u64)
        .map(|n| n as u32);
    SearchHit {
        chunk_id: chunk.chunk_id.clone(),
        file_id: chunk.file_id.clone(),
        path,
        snippet: chunk.snippet.clone(),
        score,
        page_number,
        sub_query_index,
    }
}

async fn emit_step(
    events: &Sender<StreamEvent>,
    id: &str,
    title: &str,
    status: ThinkingStepStatus,
    summary: Option<String>,
) {
    let _ = events
        .send(StreamEvent::ThinkingStep(ThinkingStep {
            id: id.to_string(),
            title: title.to_string(),
            status,
            summary,
            items: None,
            queries: None,
            files: None,
            duration_ms: None,
        }))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_clients::ClientError;
    use context_protocol::{ChunkVersion, FileKind, FileRecord};
    use context_vector_store::InMemoryVectorStore;
    use std::collections::HashMap;

    struct StubEmbedding;
    #[async_trait::async_trait]
    impl EmbeddingClient for StubEmbedding {
        async fn encode(&self, texts: &[String]) -> context_clients::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
        }
    }

    struct StubRerank;
    #[async_trait::async_trait]
    impl RerankClient for StubRerank {
        async fn rerank(&self, _query: &str, passages: &[String]) -> context_clients::Result<Vec<f32>> {
            Ok(passages.iter().map(|p| p.len() as f32).collect())
        }
    }

    struct StubLlm {
        response: String,
    }
    #[async_trait::async_trait]
    impl LlmClient for StubLlm {
        async fn chat_complete(
            &self,
            _messages: Vec<ChatMessage>,
            _max_tokens: u32,
        ) -> context_clients::Result<String> {
            Ok(self.response.clone())
        }

        async fn stream_chat_complete(
            &self,
            _messages: Vec<ChatMessage>,
            _max_tokens: u32,
        ) -> context_clients::Result<context_clients::TokenStream> {
            Err(ClientError::Cancelled)
        }
    }

    fn chunk(file_id: &str, text: &str) -> ChunkSnapshot {
        ChunkSnapshot {
            chunk_id: format!("{file_id}::fast::0"),
            file_id: file_id.to_string(),
            ordinal: 0,
            text: text.to_string(),
            snippet: ChunkSnapshot::snippet_of(text, 400),
            token_count: 2,
            char_count: text.len() as u32,
            section_path: None,
            metadata: HashMap::new(),
            created_at: chrono::Utc::now(),
            version: ChunkVersion::Fast,
        }
    }

    #[tokio::test]
    async fn verified_candidates_survive_confidence_threshold() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        storage
            .upsert_file(&FileRecord::new("f1", "report.pdf", FileKind::Text))
            .unwrap();
        storage
            .replace_chunks("f1", ChunkVersion::Fast, &[chunk("f1", "revenue rose four percent")])
            .unwrap();

        let vector_store = Arc::new(InMemoryVectorStore::new());
        let pipeline = StandardPipeline::new(
            storage,
            vector_store,
            Arc::new(StubEmbedding),
            Arc::new(StubRerank),
            Arc::new(StubLlm {
                response: "[{\"has_answer\": true, \"confidence\": 0.9, \
                    \"extracted_content\": \"revenue rose four percent\", \
                    \"source_ref\": \"report.pdf\"}]"
                    .to_string(),
            }),
        );

        let (tx, mut rx) = tokio::sync::mpsc::channel(32);
        let outcome = pipeline.execute("revenue", 4, None, None, &tx, "test").await.unwrap();
        drop(tx);
        while rx.recv().await.is_some() {}

        assert_eq!(outcome.verified.len(), 1);
        assert_eq!(outcome.verified[0].source, "report.pdf");
    }
}
