use crate::error::Result;
use async_trait::async_trait;
use context_protocol::{VectorDocument, VectorFilter};

/// A scored search result: `doc_id` (the chunk id) plus its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub doc_id: String,
    pub score: f32,
}

/// Dense vector storage with server-side metadata filtering (§4.3).
///
/// `upsert` is durable once the returned future resolves; `flush` is
/// advisory and exists so implementations backed by a remote index can
/// batch writes without losing the "searches see the most recent upsert
/// from this process" guarantee.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, documents: Vec<VectorDocument>) -> Result<()>;

    async fn flush(&self) -> Result<()>;

    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorMatch>>;

    async fn delete(&self, ids: &[String]) -> Result<()>;
}
