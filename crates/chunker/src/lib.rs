//! Bounded-window text chunking shared by the fast and deep indexing rounds.

mod chunker;
mod config;
mod error;

pub use chunker::Chunker;
pub use config::ChunkerConfig;
pub use error::{ChunkerError, Result};
