use crate::error::Result;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use context_protocol::{
    EpisodeRecord, EventLogRecord, ForesightRecord, MemorizeRequest, MemorizeResult,
    SearchMemoryRequest, SearchMemoryResult, UserMemorySummary,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

/// `POST /memory/memorize`.
pub async fn memorize(State(state): State<AppState>, Json(payload): Json<MemorizeRequest>) -> Result<Json<MemorizeResult>> {
    Ok(Json(state.memory.memorize(payload)?))
}

/// `POST /memory/search`.
pub async fn search_memories(
    State(state): State<AppState>,
    Json(payload): Json<SearchMemoryRequest>,
) -> Result<Json<SearchMemoryResult>> {
    Ok(Json(state.memory.search(&payload)?))
}

/// `GET /memory/{user_id}`.
pub async fn user_summary(State(state): State<AppState>, Path(user_id): Path<String>) -> Result<Json<UserMemorySummary>> {
    Ok(Json(state.memory.get_user_summary(&user_id)?))
}

/// `GET /memory/{user_id}/episodes`.
pub async fn episodes(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<EpisodeRecord>>> {
    Ok(Json(state.memory.get_episodes(&user_id, page.limit, page.offset)?))
}

/// `GET /memory/{user_id}/events`.
pub async fn event_logs(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<EventLogRecord>>> {
    Ok(Json(state.memory.get_event_logs(&user_id, page.limit, page.offset)?))
}

/// `GET /memory/{user_id}/foresights`.
pub async fn foresights(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<ForesightRecord>>> {
    Ok(Json(state.memory.get_foresights(&user_id, page.limit)?))
}
