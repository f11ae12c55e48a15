use crate::error::{ChunkerError, Result};

/// Mirrors the `rag_chunk_size` / `rag_chunk_overlap` / `max_snippet_length`
/// / `pdf_one_chunk_per_page` settings (§6).
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    /// Window size, in whitespace-delimited words, approximating tokens.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_snippet_length: usize,
    /// When true, text carrying `--PAGE_N--` headers (the convention this
    /// workspace uses for page-delimited extraction, see §9) is split one
    /// chunk per page instead of by sliding window.
    pub one_chunk_per_page: bool,
}

impl ChunkerConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ChunkerError::InvalidConfig(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkerError::InvalidConfig(
                "chunk_overlap must be < chunk_size".to_string(),
            ));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            max_snippet_length: 400,
            one_chunk_per_page: true,
        })
    }

    #[must_use]
    pub fn with_max_snippet_length(mut self, len: usize) -> Self {
        self.max_snippet_length = len;
        self
    }

    #[must_use]
    pub fn with_one_chunk_per_page(mut self, enabled: bool) -> Self {
        self.one_chunk_per_page = enabled;
        self
    }

    /// A permissive default, used when the caller has not yet loaded
    /// settings (e.g. early bootstrap, or tests).
    #[must_use]
    pub fn for_embeddings() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 64,
            max_snippet_length: 400,
            one_chunk_per_page: true,
        }
    }
}
