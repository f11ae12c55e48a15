use crate::error::Result;
use crate::parsed::{IndexingMode, ParsedContent};
use std::path::Path;

/// A capability interface for one file-format parser (§9 "Dynamic dispatch
/// on parsers"). Concrete implementations (PDF, image, audio, video, Office
/// formats) are out of scope for this core; only the seam is specified
/// here, plus the minimal parsers needed to exercise the pipeline.
pub trait BaseParser: Send + Sync {
    /// Lower-cased extensions this parser claims, without the leading dot.
    fn extensions(&self) -> &[&str];

    fn parse(&self, path: &Path, mode: IndexingMode) -> Result<ParsedContent>;
}

/// Plain-text / Markdown / CSV parser: reads the file as UTF-8 (lossy).
pub struct TextParser;

impl BaseParser for TextParser {
    fn extensions(&self) -> &[&str] {
        &["txt", "md", "mdx", "csv", "log", "json", "yaml", "yml"]
    }

    fn parse(&self, path: &Path, _mode: IndexingMode) -> Result<ParsedContent> {
        let bytes = std::fs::read(path).map_err(|source| crate::error::ContentError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(ParsedContent::text_only(String::from_utf8_lossy(&bytes)))
    }
}

/// Last-resort parser: never fails, always matches, yields empty text.
/// Mirrors the original implementation's `GeneralParser` fallback.
pub struct GeneralParser;

impl BaseParser for GeneralParser {
    fn extensions(&self) -> &[&str] {
        &[]
    }

    fn parse(&self, _path: &Path, _mode: IndexingMode) -> Result<ParsedContent> {
        Ok(ParsedContent::default())
    }
}

/// Selects the first parser in `parsers` whose extension list contains
/// `path`'s extension.
#[must_use]
pub fn select_parser<'a>(
    parsers: &'a [Box<dyn BaseParser>],
    path: &Path,
) -> Option<&'a dyn BaseParser> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)?;
    parsers
        .iter()
        .find(|parser| parser.extensions().iter().any(|e| *e == ext))
        .map(std::convert::AsRef::as_ref)
}
