use thiserror::Error;

pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error(transparent)]
    Storage(#[from] context_storage::StorageError),

    #[error("no memory record found for user {0}")]
    UserNotFound(String),

    #[error("memorize request for user {0} carried no episode, event log, foresight, or profile update")]
    EmptyRequest(String),
}
