use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContentError>;

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no parser available for {0}")]
    Unsupported(String),

    #[error("parser failed: {0}")]
    ParserFailed(String),
}
