//! Parsed-content contract and the fixed-order content router (§4.2, §9).
//!
//! This crate defines the seam between file discovery and chunking: a
//! [`BaseParser`] per format, and a [`ContentRouter`] that picks one,
//! special-casing PDFs so the fast/deep split can choose text extraction
//! or vision transcription per file.

mod error;
mod parsed;
mod parser;
mod router;

pub use error::{ContentError, Result};
pub use parsed::{IndexingMode, ParsedContent};
pub use parser::{select_parser, BaseParser, GeneralParser, TextParser};
pub use router::{ContentRouter, PdfMode};
