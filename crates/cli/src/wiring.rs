use crate::config::AppConfig;
use anyhow::Result;
use context_chunker::{Chunker, ChunkerConfig};
use context_clients::{HttpEmbeddingClient, HttpLlmClient, HttpRerankClient, HttpVisionClient};
use context_content::{ContentRouter, GeneralParser, PdfMode};
use context_indexer::{DeepProcessor, FastProcessor, IndexerScheduler, StateManager};
use context_memory::MemoryService;
use context_search::SearchEngine;
use context_server::{EndpointsConfig, ServerDeps, SettingsStore};
use context_storage::Storage;
use context_vector_store::InMemoryVectorStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything built once at process start and shared between the HTTP
/// server and the indexing scheduler. Both `serve` and `index` construct
/// this the same way, so the two subcommands never drift.
pub struct Runtime {
    pub storage: Arc<Storage>,
    pub settings_store: Arc<SettingsStore>,
    pub scheduler: Arc<IndexerScheduler>,
    pub state: Arc<StateManager>,
    pub search: Arc<SearchEngine>,
    pub memory: Arc<MemoryService>,
    pub endpoints: Arc<EndpointsConfig>,
}

impl Runtime {
    pub fn build(config: &AppConfig) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config.db_path)?);
        let settings_store = Arc::new(SettingsStore::load(&config.settings_path)?);
        let settings = settings_store.snapshot();

        let vector_store = Arc::new(InMemoryVectorStore::new());
        let embedding_client = Arc::new(HttpEmbeddingClient::new(config.endpoints.embedding.clone(), CLIENT_TIMEOUT));
        let rerank_client = Arc::new(HttpRerankClient::new(config.endpoints.rerank.clone(), CLIENT_TIMEOUT));
        let vision_url = config.endpoints.vision.clone().unwrap_or_default();
        let vision_client = Arc::new(HttpVisionClient::new(vision_url.clone(), CLIENT_TIMEOUT));
        let llm_client = Arc::new(HttpLlmClient::new(vision_url, CLIENT_TIMEOUT));

        let pdf_mode = match settings.pdf_mode {
            context_protocol::PdfMode::Text => PdfMode::Text,
            context_protocol::PdfMode::Vision => PdfMode::Vision,
        };
        let router = Arc::new(ContentRouter::with_defaults(
            Box::new(GeneralParser),
            Box::new(GeneralParser),
            pdf_mode,
            settings.pdf_fast_allow_vision_fallback,
        ));
        let chunker = Arc::new(Chunker::new(
            ChunkerConfig::new(settings.rag_chunk_size, settings.rag_chunk_overlap)?
                .with_max_snippet_length(settings.max_snippet_length)
                .with_one_chunk_per_page(settings.pdf_one_chunk_per_page),
        ));

        let state = Arc::new(StateManager::new());
        let fast = Arc::new(FastProcessor::new(
            Arc::clone(&storage),
            Arc::clone(&router),
            Arc::clone(&chunker),
            Arc::clone(&vector_store) as Arc<dyn context_vector_store::VectorStore>,
            Arc::clone(&embedding_client) as Arc<dyn context_clients::EmbeddingClient>,
            Arc::clone(&state),
        ));
        let deep = Arc::new(DeepProcessor::new(
            Arc::clone(&storage),
            router,
            Arc::clone(&vector_store) as Arc<dyn context_vector_store::VectorStore>,
            Arc::clone(&embedding_client) as Arc<dyn context_clients::EmbeddingClient>,
            vision_client as Arc<dyn context_clients::VisionClient>,
            Arc::clone(&state),
        ));
        let settings_cell = Arc::new(Mutex::new((*settings).clone()));
        let scheduler = IndexerScheduler::new(Arc::clone(&storage), fast, deep, Arc::clone(&state), settings_cell);

        let search = Arc::new(SearchEngine::new(
            Arc::clone(&storage),
            vector_store as Arc<dyn context_vector_store::VectorStore>,
            embedding_client as Arc<dyn context_clients::EmbeddingClient>,
            rerank_client as Arc<dyn context_clients::RerankClient>,
            llm_client as Arc<dyn context_clients::LlmClient>,
        ));
        let memory = Arc::new(MemoryService::new(Arc::clone(&storage)));

        Ok(Self {
            storage,
            settings_store,
            scheduler,
            state,
            search,
            memory,
            endpoints: Arc::new(config.endpoints.clone()),
        })
    }

    pub fn into_server_deps(self) -> ServerDeps {
        ServerDeps {
            storage: self.storage,
            indexer_state: self.state,
            search: self.search,
            memory: self.memory,
            settings: self.settings_store,
            endpoints: self.endpoints,
        }
    }
}
