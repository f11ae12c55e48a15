use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("content error: {0}")]
    Content(#[from] context_content::ContentError),

    #[error("chunker error: {0}")]
    Chunker(#[from] context_chunker::ChunkerError),

    #[error("storage error: {0}")]
    Storage(#[from] context_storage::StorageError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] context_vector_store::VectorStoreError),

    #[error("client error: {0}")]
    Client(#[from] context_clients::ClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blocking task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("watcher error: {0}")]
    Watcher(String),

    #[error("file not found: {0}")]
    FileNotFound(String),
}
