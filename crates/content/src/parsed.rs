use std::collections::HashMap;

/// Whether a parse call is for the cheap fast round or the VLM-backed deep
/// round (§4.2 `ContentRouter.parse(path, indexing_mode=...)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexingMode {
    Fast,
    Deep,
}

/// Output of parsing one file. `attachments` carries page renders
/// (`page_1`, `page_2`, ...) for the deep PDF path; `preview_image` is the
/// single representative image used for images/presentations.
#[derive(Debug, Clone, Default)]
pub struct ParsedContent {
    pub text: String,
    pub attachments: HashMap<String, Vec<u8>>,
    pub page_count: Option<u32>,
    pub preview_image: Option<Vec<u8>>,
}

impl ParsedContent {
    #[must_use]
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: HashMap::new(),
            page_count: None,
            preview_image: None,
        }
    }

    #[must_use]
    pub fn is_empty_text(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Page attachments in ascending numeric order, as the deep PDF path
    /// requires (§4.5 step 4, "iterate pages in numeric order").
    #[must_use]
    pub fn ordered_pages(&self) -> Vec<(u32, &[u8])> {
        let mut pages: Vec<(u32, &[u8])> = self
            .attachments
            .iter()
            .filter_map(|(key, bytes)| {
                key.strip_prefix("page_")
                    .and_then(|n| n.parse::<u32>().ok())
                    .map(|n| (n, bytes.as_slice()))
            })
            .collect();
        pages.sort_by_key(|(n, _)| *n);
        pages
    }
}
