use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("storage error: {0}")]
    Storage(#[from] context_storage::StorageError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] context_vector_store::VectorStoreError),

    #[error("client error: {0}")]
    Client(#[from] context_clients::ClientError),
}
