use crate::error::Result;
use crate::state::AppState;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use context_protocol::{QaRequest, QaResponse, SearchRequest, SearchResponse};
use futures::StreamExt;

/// `POST /search`: one-shot retrieval, no synthesis.
pub async fn search(State(state): State<AppState>, Json(payload): Json<SearchRequest>) -> Result<Json<SearchResponse>> {
    let response = state.search.search(&payload).await?;
    Ok(Json(response))
}

/// `POST /qa`: one-shot QA, draining the same stream `/search/stream`
/// serves (§4.7.6, `QaMixin.answer`).
pub async fn qa(State(state): State<AppState>, Json(payload): Json<QaRequest>) -> Json<QaResponse> {
    Json(state.search.answer(payload).await)
}

/// `POST /search/stream`: the streamed NDJSON answer. Each line is one
/// JSON-encoded [`context_protocol::StreamEvent`].
pub async fn search_stream(State(state): State<AppState>, Json(payload): Json<QaRequest>) -> impl IntoResponse {
    let events = state.search.stream_answer(payload);
    let body_stream = events.map(|event| {
        let mut line = serde_json::to_vec(&event).unwrap_or_default();
        line.push(b'\n');
        Ok::<Bytes, std::io::Error>(Bytes::from(line))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(body_stream))
        .expect("static response parts never fail to build")
}
