use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Storage(#[from] context_storage::StorageError),

    #[error(transparent)]
    Search(#[from] context_search::SearchError),

    #[error(transparent)]
    Memory(#[from] context_memory::MemoryError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Memory(context_memory::MemoryError::UserNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Memory(context_memory::MemoryError::EmptyRequest(_)) => StatusCode::BAD_REQUEST,
            Self::Storage(_) | Self::Search(_) | Self::Memory(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
