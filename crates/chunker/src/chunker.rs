use crate::config::ChunkerConfig;
use crate::error::Result;
use chrono::Utc;
use context_protocol::{ChunkSnapshot, ChunkVersion};
use unicode_segmentation::UnicodeSegmentation;

/// Splits extracted text into ordered, overlapping chunks.
///
/// Two modes, selected per call:
/// - page mode: text carries `--PAGE_N--` headers (produced by the deep PDF
///   path, §9); one chunk per page, in page order.
/// - sliding-window mode: plain sliding window over whitespace-delimited
///   words, sized in `chunk_size` words with `chunk_overlap` words of
///   repeat between consecutive chunks.
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    #[must_use]
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Chunk `text` extracted from `file_id` into `version`-tagged chunks.
    ///
    /// Returns an empty vector for blank input (the "nothing to index"
    /// terminal handled one level up by the fast processor, §4.4 step 3).
    pub fn chunk_text(
        &self,
        file_id: &str,
        text: &str,
        version: ChunkVersion,
    ) -> Result<Vec<ChunkSnapshot>> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        if self.config.one_chunk_per_page && trimmed.contains("--PAGE_") {
            return Ok(self.chunk_by_page(file_id, trimmed, version));
        }

        Ok(self.chunk_by_window(file_id, trimmed, version))
    }

    fn chunk_by_page(
        &self,
        file_id: &str,
        text: &str,
        version: ChunkVersion,
    ) -> Vec<ChunkSnapshot> {
        let mut chunks = Vec::new();
        let mut ordinal = 0u32;
        for block in text.split("--PAGE_").skip(1) {
            let Some((header, body)) = block.split_once("--") else {
                continue;
            };
            let Ok(page_number) = header.trim().parse::<u32>() else {
                continue;
            };
            let body = body.trim();
            if body.is_empty() {
                continue;
            }
            chunks.push(self.build_chunk(
                file_id,
                &format!("{file_id}::{}::page_{page_number}", version.as_str()),
                ordinal,
                body,
                Some(format!("page_{page_number}")),
                version,
            ));
            ordinal += 1;
        }
        chunks
    }

    fn chunk_by_window(
        &self,
        file_id: &str,
        text: &str,
        version: ChunkVersion,
    ) -> Vec<ChunkSnapshot> {
        let words: Vec<&str> = text.unicode_words().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let step = self.config.chunk_size - self.config.chunk_overlap;
        let mut chunks = Vec::new();
        let mut ordinal = 0u32;
        let mut start = 0usize;

        while start < words.len() {
            let end = (start + self.config.chunk_size).min(words.len());
            let body = reconstruct_window(text, &words, start, end);
            if !body.trim().is_empty() {
                chunks.push(self.build_chunk(
                    file_id,
                    &format!("{file_id}::{}::{ordinal}", version.as_str()),
                    ordinal,
                    body.trim(),
                    None,
                    version,
                ));
                ordinal += 1;
            }
            if end == words.len() {
                break;
            }
            start += step.max(1);
        }

        chunks
    }

    fn build_chunk(
        &self,
        file_id: &str,
        chunk_id: &str,
        ordinal: u32,
        body: &str,
        section_path: Option<String>,
        version: ChunkVersion,
    ) -> ChunkSnapshot {
        ChunkSnapshot {
            chunk_id: chunk_id.to_string(),
            file_id: file_id.to_string(),
            ordinal,
            text: body.to_string(),
            snippet: ChunkSnapshot::snippet_of(body, self.config.max_snippet_length),
            token_count: approximate_token_count(body),
            char_count: body.chars().count() as u32,
            section_path,
            metadata: Default::default(),
            created_at: Utc::now(),
            version,
        }
    }
}

/// Mirrors the original implementation's `len(text) // 4` heuristic for
/// estimating a token count without calling the tokenizer endpoint.
fn approximate_token_count(text: &str) -> u32 {
    ((text.chars().count() / 4).max(1)) as u32
}

/// Rebuilds the substring of `text` spanning words `[start, end)`, since
/// `unicode_words` discards surrounding whitespace/punctuation offsets.
fn reconstruct_window(text: &str, words: &[&str], start: usize, end: usize) -> String {
    if words.is_empty() || start >= end {
        return String::new();
    }
    let first = words[start];
    let last = words[end - 1];
    let from = text.find(first).unwrap_or(0);
    let rest = &text[from..];
    let last_pos = rest.rfind(last).map(|p| from + p + last.len());
    match last_pos {
        Some(to) if to > from => text[from..to].to_string(),
        _ => words[start..end].join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChunkerConfig {
        ChunkerConfig::new(10, 2).unwrap()
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = Chunker::new(config());
        let chunks = chunker.chunk_text("f1", "   ", ChunkVersion::Fast).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn sliding_window_produces_dense_ordinals() {
        let chunker = Chunker::new(config());
        let text = (0..35)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunker.chunk_text("f1", &text, ChunkVersion::Fast).unwrap();
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i as u32);
            assert_eq!(chunk.version, ChunkVersion::Fast);
        }
    }

    #[test]
    fn chunk_ids_are_unique_within_version() {
        let chunker = Chunker::new(config());
        let text = (0..50)
            .map(|i| format!("token{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunker.chunk_text("f1", &text, ChunkVersion::Fast).unwrap();
        let mut ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        let before = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }

    #[test]
    fn page_marked_text_splits_one_chunk_per_page() {
        let chunker = Chunker::new(config());
        let text = "--PAGE_1--\n\nfirst page body\n\n--PAGE_2--\n\nsecond page body";
        let chunks = chunker.chunk_text("f1", text, ChunkVersion::Deep).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].section_path.as_deref(), Some("page_1"));
        assert_eq!(chunks[1].section_path.as_deref(), Some("page_2"));
        assert!(chunks[0].text.contains("first page body"));
    }

    #[test]
    fn snippet_is_truncated() {
        let chunker = Chunker::new(ChunkerConfig::new(100, 0).unwrap().with_max_snippet_length(5));
        let chunks = chunker
            .chunk_text("f1", "abcdefghij", ChunkVersion::Fast)
            .unwrap();
        assert_eq!(chunks[0].snippet, "abcde");
    }
}
