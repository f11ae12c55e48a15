//! `axum`-based HTTP surface (§6): health, settings, search/QA, and the
//! memory routes. This crate only builds and serves the router; process
//! wiring (constructing storage, clients, and the search engine) is
//! `context-cli`'s job.

mod config;
mod error;
mod health;
mod memory;
mod search;
mod settings;
mod state;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::EndpointsConfig;
pub use error::{Result, ServerError};
pub use health::{HealthCache, HealthResponse, ServiceStatus};
pub use settings::{SettingsPatch, SettingsStore};
pub use state::AppState;

/// Everything `context-cli` must construct before the server can run.
pub struct ServerDeps {
    pub storage: Arc<context_storage::Storage>,
    pub indexer_state: Arc<context_indexer::StateManager>,
    pub search: Arc<context_search::SearchEngine>,
    pub memory: Arc<context_memory::MemoryService>,
    pub settings: Arc<SettingsStore>,
    pub endpoints: Arc<EndpointsConfig>,
}

impl ServerDeps {
    fn into_state(self) -> AppState {
        AppState {
            storage: self.storage,
            indexer_state: self.indexer_state,
            search: self.search,
            memory: self.memory,
            settings: self.settings,
            endpoints: self.endpoints,
            health_cache: Arc::new(HealthCache::new()),
        }
    }
}

/// Builds the full route tree (§6 HTTP surface), with tracing and a
/// permissive CORS layer, matching `AlrikOlson-codescope`'s server setup.
#[must_use]
pub fn build_router(deps: ServerDeps) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/settings/", get(settings::get_settings).patch(settings::patch_settings))
        .route("/search", post(search::search))
        .route("/search/stream", post(search::search_stream))
        .route("/qa", post(search::qa))
        .route("/memory/memorize", post(memory::memorize))
        .route("/memory/search", post(memory::search_memories))
        .route("/memory/:user_id", get(memory::user_summary))
        .route("/memory/:user_id/episodes", get(memory::episodes))
        .route("/memory/:user_id/events", get(memory::event_logs))
        .route("/memory/:user_id/foresights", get(memory::foresights))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(deps.into_state())
}

/// Binds `bind_addr` and serves the router until the process is
/// terminated.
pub async fn serve(bind_addr: &str, deps: ServerDeps) -> anyhow::Result<()> {
    let app = build_router(deps);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = bind_addr, "context-server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
