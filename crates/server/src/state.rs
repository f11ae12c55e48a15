use crate::config::EndpointsConfig;
use crate::health::HealthCache;
use crate::settings::SettingsStore;
use context_indexer::StateManager;
use context_memory::MemoryService;
use context_search::SearchEngine;
use context_storage::Storage;
use std::sync::Arc;

/// Shared application state, cloned into every axum handler. Every field
/// is an `Arc` (or wraps one), so cloning is cheap (§4.1 singleton state
/// pattern, generalized to the HTTP layer).
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub indexer_state: Arc<StateManager>,
    pub search: Arc<SearchEngine>,
    pub memory: Arc<MemoryService>,
    pub settings: Arc<SettingsStore>,
    pub endpoints: Arc<EndpointsConfig>,
    pub health_cache: Arc<HealthCache>,
}
