use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const CACHE_TTL: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ServiceStatus {
    pub name: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ServiceStatus {
    fn unknown(name: &str) -> Self {
        Self { name: name.to_string(), status: "unknown", latency_ms: None, details: Some("URL not configured".to_string()) }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub indexed_files: usize,
    pub watched_folders: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub services: Vec<ServiceStatus>,
}

/// Caches upstream service probes for 10s, keyed by `name:url` (§6
/// health-cache contract).
#[derive(Default)]
pub struct HealthCache {
    entries: Mutex<HashMap<String, (ServiceStatus, Instant)>>,
}

impl HealthCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Probes `GET <url>/health`, falling back to `GET <url>` on a 404.
    /// Any 2xx-4xx response within the timeout is `online`; a 5xx or a
    /// transport error is `offline`. Results are cached for 10s.
    pub async fn check(&self, name: &str, url: Option<&str>) -> ServiceStatus {
        let Some(url) = url else {
            return ServiceStatus::unknown(name);
        };

        let cache_key = format!("{name}:{url}");
        if let Some((status, fetched_at)) = self.entries.lock().expect("health cache poisoned").get(&cache_key) {
            if fetched_at.elapsed() < CACHE_TTL {
                return status.clone();
            }
        }

        let result = probe(name, url).await;
        self.entries
            .lock()
            .expect("health cache poisoned")
            .insert(cache_key, (result.clone(), Instant::now()));
        result
    }
}

async fn probe(name: &str, url: &str) -> ServiceStatus {
    let client = match reqwest::Client::builder().timeout(PROBE_TIMEOUT).build() {
        Ok(client) => client,
        Err(err) => {
            return ServiceStatus { name: name.to_string(), status: "offline", latency_ms: None, details: Some(err.to_string()) }
        }
    };

    let started = Instant::now();
    let trimmed = url.trim_end_matches('/');
    let mut response = client.get(format!("{trimmed}/health")).send().await;
    if let Ok(ref resp) = response {
        if resp.status().as_u16() == 404 {
            response = client.get(trimmed).send().await;
        }
    }

    match response {
        Ok(resp) if (200..500).contains(&resp.status().as_u16()) => ServiceStatus {
            name: name.to_string(),
            status: "online",
            latency_ms: Some(started.elapsed().as_secs_f64() * 1000.0),
            details: None,
        },
        Ok(resp) => ServiceStatus {
            name: name.to_string(),
            status: "offline",
            latency_ms: None,
            details: Some(format!("HTTP {}", resp.status())),
        },
        Err(err) => ServiceStatus { name: name.to_string(), status: "offline", latency_ms: None, details: Some(err.to_string()) },
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let counts = state.storage.counts().unwrap_or_default();
    let indexer_status = state.indexer_state.status();

    let mut status = if counts.files > 0 { "ready" } else { "idle" };
    if matches!(
        indexer_status.status,
        context_protocol::IndexingStatus::Running | context_protocol::IndexingStatus::Paused
    ) {
        status = "indexing";
    }

    let mut message = indexer_status
        .last_error
        .clone()
        .or_else(|| indexer_status.message.clone());
    if indexer_status.status == context_protocol::IndexingStatus::Paused && message.is_none() {
        message = Some("Indexing paused.".to_string());
    }

    let endpoints = &state.endpoints;
    let mut checks = vec![
        state.health_cache.check("Embedding", Some(&endpoints.embedding)),
        state.health_cache.check("Reranker", Some(&endpoints.rerank)),
    ];
    if let Some(vision) = endpoints.vision.as_deref() {
        checks.push(state.health_cache.check("Vision/LLM", Some(vision)));
    }
    if let Some(transcription) = endpoints.transcription.as_deref() {
        checks.push(state.health_cache.check("Whisper", Some(transcription)));
    }
    let services: Vec<ServiceStatus> = futures::future::join_all(checks).await;

    if services.iter().any(|s| s.status == "offline") {
        status = "degraded";
        if message.is_none() {
            message = Some("Some AI services are offline.".to_string());
        }
    }

    Json(HealthResponse {
        status,
        indexed_files: counts.files,
        watched_folders: counts.folders,
        message,
        services,
    })
}
