use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// The one error kind every typed client surfaces (§4.8, §7): retries and
/// backoff happen inside the client, so by the time a caller sees this the
/// retry budget is exhausted.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} responded with status {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("response decoding failed: {0}")]
    Decode(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("request cancelled")]
    Cancelled,
}
