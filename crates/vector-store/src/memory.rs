use crate::error::{Result, VectorStoreError};
use crate::store::{VectorMatch, VectorStore};
use async_trait::async_trait;
use context_protocol::{VectorDocument, VectorFilter};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-process, flat cosine-similarity vector store. No ANN index: a linear
/// scan over all documents passing the filter. This is the reference
/// implementation the core ships with; a remote ANN-backed store can
/// implement the same [`VectorStore`] trait as a drop-in replacement.
#[derive(Default)]
pub struct InMemoryVectorStore {
    dimension: RwLock<Option<usize>>,
    documents: RwLock<HashMap<String, VectorDocument>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, documents: Vec<VectorDocument>) -> Result<()> {
        let mut dimension = self.dimension.write().await;
        for doc in &documents {
            match *dimension {
                Some(expected) if expected != doc.vector.len() => {
                    return Err(VectorStoreError::DimensionMismatch {
                        expected,
                        actual: doc.vector.len(),
                    });
                }
                None => *dimension = Some(doc.vector.len()),
                _ => {}
            }
        }
        let mut store = self.documents.write().await;
        for doc in documents {
            store.insert(doc.doc_id.clone(), doc);
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorMatch>> {
        let store = self.documents.read().await;
        let mut scored: Vec<VectorMatch> = store
            .values()
            .filter(|doc| filter.matches(&doc.metadata))
            .map(|doc| VectorMatch {
                doc_id: doc.doc_id.clone(),
                score: cosine_similarity(query_vector, &doc.vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut store = self.documents.write().await;
        for id in ids {
            store.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    fn doc(id: &str, vector: Vec<f32>, file_id: &str) -> VectorDocument {
        VectorDocument::new(id, vector).with_metadata("file_id", serde_json::json!(file_id))
    }

    #[tokio::test]
    async fn upsert_rejects_dimension_mismatch() {
        let store = InMemoryVectorStore::new();
        store.upsert(vec![doc("a", vec![1.0, 0.0], "f1")]).await.unwrap();
        let result = store.upsert(vec![doc("b", vec![1.0, 0.0, 0.0], "f1")]).await;
        assert!(matches!(result, Err(VectorStoreError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                doc("a", vec![1.0, 0.0], "f1"),
                doc("b", vec![0.0, 1.0], "f1"),
            ])
            .await
            .unwrap();
        let hits = store
            .search(&[1.0, 0.0], 2, &VectorFilter::default())
            .await
            .unwrap();
        assert_eq!(hits[0].doc_id, "a");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn search_honors_file_id_filter() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![doc("a", vec![1.0, 0.0], "f1"), doc("b", vec![1.0, 0.0], "f2")])
            .await
            .unwrap();
        let filter = VectorFilter {
            file_id: Some("f2".to_string()),
            ..Default::default()
        };
        let hits = store.search(&[1.0, 0.0], 10, &filter).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, "b");
    }

    #[tokio::test]
    async fn delete_removes_documents() {
        let store = InMemoryVectorStore::new();
        store.upsert(vec![doc("a", vec![1.0], "f1")]).await.unwrap();
        store.delete(&["a".to_string()]).await.unwrap();
        assert!(store.is_empty().await);
    }
}
