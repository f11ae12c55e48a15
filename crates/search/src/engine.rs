use crate::intent::{self, Intent};
use crate::multipath::MultiPathPipeline;
use crate::pipeline::StandardPipeline;
use crate::scope::{self, ScopedQuery};
use crate::synthesis::{self, SynthesisInput};
use crate::Result;
use context_clients::{ChatMessage, EmbeddingClient, LlmClient, RerankClient};
use context_protocol::{
    QaRequest, QaResponse, SearchRequest, SearchResponse, StreamEvent,
};
use context_storage::Storage;
use context_vector_store::VectorStore;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const DEFAULT_LIMIT: usize = 8;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Top-level orchestrator (§4.7): scope isolation, intent routing,
/// decomposition, the two pipelines, and streamed synthesis.
pub struct SearchEngine {
    storage: Arc<Storage>,
    llm_client: Arc<dyn LlmClient>,
    standard: Arc<StandardPipeline>,
    multipath: MultiPathPipeline,
}

impl SearchEngine {
    #[must_use]
    pub fn new(
        storage: Arc<Storage>,
        vector_store: Arc<dyn VectorStore>,
        embedding_client: Arc<dyn EmbeddingClient>,
        rerank_client: Arc<dyn RerankClient>,
        llm_client: Arc<dyn LlmClient>,
    ) -> Self {
        let standard = Arc::new(StandardPipeline::new(
            Arc::clone(&storage),
            vector_store,
            embedding_client,
            rerank_client,
            Arc::clone(&llm_client),
        ));
        let multipath = MultiPathPipeline::new(Arc::clone(&standard));
        Self { storage, llm_client, standard, multipath }
    }

    /// One-shot retrieval (`POST /search`, §6): scope isolation plus
    /// ranked hits, no verification or synthesis.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let started = Instant::now();
        let scoped = self.resolve_scope(&request.query, request.folder_ids.as_deref())?;
        let limit = request.limit.unwrap_or(DEFAULT_LIMIT);

        let hits = if is_empty_allowlist(&scoped) {
            Vec::new()
        } else {
            self.standard
                .search_only(&scoped.query, limit, scoped.allowlist.as_deref())
                .await?
        };

        Ok(SearchResponse { hits, latency_ms: started.elapsed().as_millis() as u64 })
    }

    /// One-shot QA (`POST /qa`, §6): drains [`Self::stream_answer`] into
    /// a single response, mirroring the original's `QaMixin.answer`.
    pub async fn answer(&self, payload: QaRequest) -> QaResponse {
        let started = Instant::now();
        let mut stream = self.stream_answer(payload);
        let mut answer = String::new();
        let mut hits = Vec::new();
        let mut diagnostics = Vec::new();

        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Token(token) => answer.push_str(&token),
                StreamEvent::Hits(event_hits) => hits = event_hits,
                StreamEvent::ThinkingStep(step) => {
                    diagnostics.push(serde_json::to_value(&step).unwrap_or(serde_json::Value::Null));
                }
                StreamEvent::Error(message) => {
                    answer.push_str(&format!("\nError: {message}"));
                }
                StreamEvent::Status(_) | StreamEvent::Done(_) => {}
            }
        }

        QaResponse {
            answer: answer.trim().to_string(),
            hits,
            latency_ms: started.elapsed().as_millis() as u64,
            diagnostics,
        }
    }

    /// Streamed NDJSON QA (`POST /search/stream`, §4.7.6). Spawns the
    /// orchestration as a background task and returns the receiving end
    /// as a stream, since there is no async-generator equivalent here.
    pub fn stream_answer(&self, payload: QaRequest) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let storage = Arc::clone(&self.storage);
        let llm_client = Arc::clone(&self.llm_client);
        let standard = Arc::clone(&self.standard);
        let multipath = self.multipath.clone();

        tokio::spawn(async move {
            run_stream(storage, llm_client, standard, multipath, payload, tx).await;
        });

        ReceiverStream::new(rx)
    }

    fn resolve_scope(&self, query: &str, folder_ids: Option<&[String]>) -> Result<ScopedQuery> {
        Ok(scope::resolve_scope(&self.storage, query, folder_ids)?)
    }
}

fn is_empty_allowlist(scoped: &ScopedQuery) -> bool {
    matches!(&scoped.allowlist, Some(ids) if ids.is_empty())
}

async fn run_stream(
    storage: Arc<Storage>,
    llm_client: Arc<dyn LlmClient>,
    standard: Arc<StandardPipeline>,
    multipath: MultiPathPipeline,
    payload: QaRequest,
    events: mpsc::Sender<StreamEvent>,
) {
    let limit = payload.limit.unwrap_or(DEFAULT_LIMIT);

    let scoped = match scope::resolve_scope(&storage, &payload.query, payload.folder_ids.as_deref())
    {
        Ok(scoped) => scoped,
        Err(err) => {
            let _ = events.send(StreamEvent::Error(err.to_string())).await;
            let _ = events.send(StreamEvent::Done(None)).await;
            return;
        }
    };

    if payload.search_mode == "direct" || payload.mode.as_deref() == Some("chat") {
        stream_direct_answer(&llm_client, &payload.query, &events).await;
        return;
    }

    let _ = events.send(StreamEvent::Status("searching".to_string())).await;

    let (call_tools, is_greeting) = if payload.search_mode == "knowledge" {
        (true, false)
    } else {
        match intent::classify_intent(llm_client.as_ref(), &scoped.query).await {
            Ok(routing) => (routing.call_tools, routing.intent == Intent::Greeting),
            Err(err) => {
                log::warn!("intent routing failed, defaulting to retrieval: {err}");
                (true, false)
            }
        }
    };

    if !call_tools {
        let _ = events.send(StreamEvent::Status("direct_answer".to_string())).await;
        stream_no_tools_answer(&llm_client, &payload.query, is_greeting, &events).await;
        return;
    }

    if is_empty_allowlist(&scoped) {
        let _ = events.send(StreamEvent::Hits(Vec::new())).await;
        let _ = events
            .send(StreamEvent::Done(Some("I couldn't find any relevant documents.".to_string())))
            .await;
        return;
    }

    let decomposition = match intent::analyze_query(llm_client.as_ref(), &scoped.query).await {
        Ok(decomposition) => decomposition,
        Err(err) => {
            log::warn!("query decomposition failed, using a single query: {err}");
            crate::intent::Decomposition {
                needs_decomposition: false,
                sub_queries: vec![scoped.query.clone()],
                strategy: "single".to_string(),
            }
        }
    };

    let verified = if decomposition.needs_decomposition {
        let (_, verified) = match multipath
            .execute(&decomposition.sub_queries, limit, scoped.allowlist.as_deref(), &events)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                let _ = events.send(StreamEvent::Error(err.to_string())).await;
                let _ = events.send(StreamEvent::Done(None)).await;
                return;
            }
        };
        verified
    } else {
        let outcome = match standard
            .execute(&scoped.query, limit, scoped.allowlist.as_deref(), None, &events, "single")
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                let _ = events.send(StreamEvent::Error(err.to_string())).await;
                let _ = events.send(StreamEvent::Done(None)).await;
                return;
            }
        };
        outcome.verified
    };

    if verified.is_empty() {
        let _ = events
            .send(StreamEvent::Done(Some("I couldn't find any relevant documents.".to_string())))
            .await;
        return;
    }

    stream_synthesis(&llm_client, &payload.query, &verified, &events).await;
    let _ = events.send(StreamEvent::Done(None)).await;
}

async fn stream_direct_answer(llm_client: &Arc<dyn LlmClient>, query: &str, events: &mpsc::Sender<StreamEvent>) {
    let _ = events.send(StreamEvent::Status("answering".to_string())).await;
    let messages = vec![
        ChatMessage::new("system", synthesis::direct_answer_system_prompt()),
        ChatMessage::new("user", query),
    ];
    stream_tokens(llm_client, messages, 1024, events).await;
    let _ = events.send(StreamEvent::Done(None)).await;
}

async fn stream_no_tools_answer(
    llm_client: &Arc<dyn LlmClient>,
    query: &str,
    is_greeting: bool,
    events: &mpsc::Sender<StreamEvent>,
) {
    let messages = vec![
        ChatMessage::new("system", synthesis::no_tools_system_prompt(is_greeting)),
        ChatMessage::new("user", query),
    ];
    stream_tokens(llm_client, messages, 512, events).await;
    let _ = events.send(StreamEvent::Done(None)).await;
}

async fn stream_synthesis(
    llm_client: &Arc<dyn LlmClient>,
    query: &str,
    verified: &[SynthesisInput],
    events: &mpsc::Sender<StreamEvent>,
) {
    match synthesis::stream_simple_aggregation(llm_client.as_ref(), query, verified, 1024).await {
        Ok(mut tokens) => {
            while let Some(token) = tokens.next().await {
                match token {
                    Ok(token) => {
                        let _ = events.send(StreamEvent::Token(token)).await;
                    }
                    Err(err) => {
                        let _ = events.send(StreamEvent::Error(err.to_string())).await;
                        break;
                    }
                }
            }
        }
        Err(err) => {
            let _ = events.send(StreamEvent::Error(err.to_string())).await;
        }
    }
}

async fn stream_tokens(
    llm_client: &Arc<dyn LlmClient>,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    events: &mpsc::Sender<StreamEvent>,
) {
    match llm_client.stream_chat_complete(messages, max_tokens).await {
        Ok(mut tokens) => {
            while let Some(token) = tokens.next().await {
                match token {
                    Ok(token) => {
                        let _ = events.send(StreamEvent::Token(token)).await;
                    }
                    Err(err) => {
                        let _ = events.send(StreamEvent::Error(err.to_string())).await;
                        break;
                    }
                }
            }
        }
        Err(_) => {
            let _ = events.send(StreamEvent::Error("LLM generation failed.".to_string())).await;
        }
    }
}
