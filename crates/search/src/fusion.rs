use context_storage::KeywordHit;
use context_vector_store::VectorMatch;
use std::collections::HashMap;

/// One fused retrieval candidate: a `chunk_id` plus its combined RRF score
/// and the source(s) that surfaced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub chunk_id: String,
    pub score: f32,
    pub from_keyword: bool,
    pub from_vector: bool,
}

/// Reciprocal Rank Fusion over keyword and vector result lists, merged by
/// equal weight and deduplicated on `chunk_id` (adapted from the teacher's
/// `RRFFusion`, which dedups by code-chunk index; here the merge key is
/// the chunk identity shared between both retrieval paths).
pub struct RrfFusion {
    k: f32,
}

impl RrfFusion {
    #[must_use]
    pub const fn new(k: f32) -> Self {
        Self { k }
    }

    /// Keyword results rank by ascending BM25 (lower is better); vector
    /// results rank by descending cosine score (higher is better). Both
    /// are converted to a rank-only contribution before fusing, so the
    /// differing score scales never need reconciling directly.
    #[must_use]
    pub fn fuse(&self, keyword: &[KeywordHit], vector: &[VectorMatch]) -> Vec<FusedHit> {
        let mut scores: HashMap<String, FusedHit> = HashMap::new();

        for (rank, hit) in keyword.iter().enumerate() {
            let rrf = 1.0 / (self.k + rank as f32 + 1.0);
            let entry = scores
                .entry(hit.chunk.chunk_id.clone())
                .or_insert_with(|| FusedHit {
                    chunk_id: hit.chunk.chunk_id.clone(),
                    score: 0.0,
                    from_keyword: false,
                    from_vector: false,
                });
            entry.score += rrf;
            entry.from_keyword = true;
        }

        for (rank, hit) in vector.iter().enumerate() {
            let rrf = 1.0 / (self.k + rank as f32 + 1.0);
            let entry = scores
                .entry(hit.doc_id.clone())
                .or_insert_with(|| FusedHit {
                    chunk_id: hit.doc_id.clone(),
                    score: 0.0,
                    from_keyword: false,
                    from_vector: false,
                });
            entry.score += rrf;
            entry.from_vector = true;
        }

        let mut fused: Vec<FusedHit> = scores.into_values().collect();
        fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        fused
    }
}

impl Default for RrfFusion {
    fn default() -> Self {
        Self::new(60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use context_protocol::{ChunkSnapshot, ChunkVersion};
    use std::collections::HashMap as Map;

    fn chunk(id: &str) -> ChunkSnapshot {
        ChunkSnapshot {
            chunk_id: id.to_string(),
            file_id: "f1".to_string(),
            ordinal: 0,
            text: "hello".to_string(),
            snippet: "hello".to_string(),
            token_count: 1,
            char_count: 5,
            section_path: None,
            metadata: Map::new(),
            created_at: Utc::now(),
            version: ChunkVersion::Fast,
        }
    }

    #[test]
    fn overlap_between_keyword_and_vector_ranks_highest() {
        let keyword = vec![
            KeywordHit { chunk: chunk("a"), bm25: 0.1 },
            KeywordHit { chunk: chunk("b"), bm25: 0.2 },
        ];
        let vector = vec![
            VectorMatch { doc_id: "b".to_string(), score: 0.9 },
            VectorMatch { doc_id: "c".to_string(), score: 0.8 },
        ];

        let fused = RrfFusion::default().fuse(&keyword, &vector);
        assert_eq!(fused[0].chunk_id, "b");
        assert!(fused[0].from_keyword && fused[0].from_vector);
    }

    #[test]
    fn disjoint_results_all_survive_with_positive_score() {
        let keyword = vec![KeywordHit { chunk: chunk("a"), bm25: 0.1 }];
        let vector = vec![VectorMatch { doc_id: "z".to_string(), score: 0.5 }];

        let fused = RrfFusion::default().fuse(&keyword, &vector);
        assert_eq!(fused.len(), 2);
        assert!(fused.iter().all(|hit| hit.score > 0.0));
    }

    #[test]
    fn empty_inputs_fuse_to_empty() {
        let fused = RrfFusion::default().fuse(&[], &[]);
        assert!(fused.is_empty());
    }
}
