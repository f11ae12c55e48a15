use crate::error::Result;
use crate::parsed::{IndexingMode, ParsedContent};
use crate::parser::{select_parser, BaseParser, GeneralParser, TextParser};
use std::path::Path;

/// PDF extraction strategy, mirrored from `context_protocol::settings::PdfMode`
/// to keep this crate free of a dependency edge onto the settings snapshot
/// type itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfMode {
    Text,
    Vision,
}

/// Fixed-order parser dispatch with an explicit PDF text-vs-vision branch
/// (§9 "Dynamic dispatch on parsers"; grounded on `content.py`'s
/// `ContentRouter.parse`). The PDF branch is not expressible through the
/// plain extension-matching `select_parser` table because the choice of
/// parser depends on `indexing_mode` and `pdf_mode`, not just the
/// extension, so it is special-cased ahead of the fixed list exactly as
/// the original does.
pub struct ContentRouter {
    parsers: Vec<Box<dyn BaseParser>>,
    pdf_text_parser: Box<dyn BaseParser>,
    pdf_vision_parser: Box<dyn BaseParser>,
    pdf_mode: PdfMode,
    pdf_fast_allow_vision_fallback: bool,
}

impl ContentRouter {
    #[must_use]
    pub fn new(
        parsers: Vec<Box<dyn BaseParser>>,
        pdf_text_parser: Box<dyn BaseParser>,
        pdf_vision_parser: Box<dyn BaseParser>,
        pdf_mode: PdfMode,
        pdf_fast_allow_vision_fallback: bool,
    ) -> Self {
        Self {
            parsers,
            pdf_text_parser,
            pdf_vision_parser,
            pdf_mode,
            pdf_fast_allow_vision_fallback,
        }
    }

    /// Builds a router with only the parsers this crate ships by default:
    /// `TextParser` plus a `GeneralParser` fallback. Callers that need PDF,
    /// image, audio, or video extraction supply their own parsers and PDF
    /// parser pair via [`ContentRouter::new`].
    #[must_use]
    pub fn with_defaults(
        pdf_text_parser: Box<dyn BaseParser>,
        pdf_vision_parser: Box<dyn BaseParser>,
        pdf_mode: PdfMode,
        pdf_fast_allow_vision_fallback: bool,
    ) -> Self {
        Self::new(
            vec![Box::new(TextParser)],
            pdf_text_parser,
            pdf_vision_parser,
            pdf_mode,
            pdf_fast_allow_vision_fallback,
        )
    }

    pub fn parse(&self, path: &Path, indexing_mode: IndexingMode) -> Result<ParsedContent> {
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            return self.parse_pdf(path, indexing_mode);
        }

        match select_parser(&self.parsers, path) {
            Some(parser) => parser.parse(path, indexing_mode),
            None => GeneralParser.parse(path, indexing_mode),
        }
    }

    fn parse_pdf(&self, path: &Path, indexing_mode: IndexingMode) -> Result<ParsedContent> {
        if indexing_mode == IndexingMode::Deep || self.pdf_mode == PdfMode::Vision {
            return self.pdf_vision_parser.parse(path, indexing_mode);
        }

        let content = self.pdf_text_parser.parse(path, indexing_mode)?;
        if content.is_empty_text() && self.pdf_fast_allow_vision_fallback {
            return self.pdf_vision_parser.parse(path, indexing_mode);
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct StubPdfParser {
        text: &'static str,
    }

    impl BaseParser for StubPdfParser {
        fn extensions(&self) -> &[&str] {
            &["pdf"]
        }

        fn parse(&self, _path: &Path, _mode: IndexingMode) -> Result<ParsedContent> {
            Ok(ParsedContent::text_only(self.text))
        }
    }

    struct StubVisionParser;

    impl BaseParser for StubVisionParser {
        fn extensions(&self) -> &[&str] {
            &["pdf"]
        }

        fn parse(&self, _path: &Path, _mode: IndexingMode) -> Result<ParsedContent> {
            Ok(ParsedContent::text_only("vision transcript"))
        }
    }

    fn pdf_path() -> NamedTempFile {
        tempfile::Builder::new().suffix(".pdf").tempfile().unwrap()
    }

    #[test]
    fn fast_mode_prefers_text_parser_when_non_empty() {
        let router = ContentRouter::new(
            vec![],
            Box::new(StubPdfParser { text: "hello" }),
            Box::new(StubVisionParser),
            PdfMode::Text,
            true,
        );
        let file = pdf_path();
        let result = router.parse(file.path(), IndexingMode::Fast).unwrap();
        assert_eq!(result.text, "hello");
    }

    #[test]
    fn fast_mode_falls_back_to_vision_when_text_is_empty() {
        let router = ContentRouter::new(
            vec![],
            Box::new(StubPdfParser { text: "   " }),
            Box::new(StubVisionParser),
            PdfMode::Text,
            true,
        );
        let file = pdf_path();
        let result = router.parse(file.path(), IndexingMode::Fast).unwrap();
        assert_eq!(result.text, "vision transcript");
    }

    #[test]
    fn fallback_disabled_keeps_empty_text() {
        let router = ContentRouter::new(
            vec![],
            Box::new(StubPdfParser { text: "" }),
            Box::new(StubVisionParser),
            PdfMode::Text,
            false,
        );
        let file = pdf_path();
        let result = router.parse(file.path(), IndexingMode::Fast).unwrap();
        assert!(result.text.is_empty());
    }

    #[test]
    fn deep_mode_always_uses_vision_parser() {
        let router = ContentRouter::new(
            vec![],
            Box::new(StubPdfParser { text: "hello" }),
            Box::new(StubVisionParser),
            PdfMode::Text,
            true,
        );
        let file = pdf_path();
        let result = router.parse(file.path(), IndexingMode::Deep).unwrap();
        assert_eq!(result.text, "vision transcript");
    }

    #[test]
    fn non_pdf_extension_uses_fixed_list_then_general_fallback() {
        let router = ContentRouter::new(
            vec![Box::new(TextParser)],
            Box::new(StubPdfParser { text: "" }),
            Box::new(StubVisionParser),
            PdfMode::Text,
            true,
        );
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "plain text body").unwrap();
        let result = router.parse(file.path(), IndexingMode::Fast).unwrap();
        assert_eq!(result.text, "plain text body");

        let unknown = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
        let result = router.parse(unknown.path(), IndexingMode::Fast).unwrap();
        assert!(result.text.is_empty());
    }
}
