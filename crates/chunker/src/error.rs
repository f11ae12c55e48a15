use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChunkerError>;

#[derive(Error, Debug)]
pub enum ChunkerError {
    #[error("invalid chunker configuration: {0}")]
    InvalidConfig(String),
}
