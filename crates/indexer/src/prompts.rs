//! Fixed VLM prompt text for the deep processing round (§4.5).

pub const IMAGE_PROMPT: &str =
    "Describe this image in detail, including any visible text, diagrams, or charts.";

pub const PDF_PAGE_PROMPT: &str =
    "Transcribe and describe the content of this document page, including any text, tables, or figures.";

pub const PRESENTATION_SLIDE_PROMPT: &str = "Describe this presentation slide in detail.";
