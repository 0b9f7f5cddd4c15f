//! The reranker collaborator surface used by `qorch-retriever`'s optional
//! re-ranking pass over the fused RRF candidates.

use async_trait::async_trait;
use qorch_core::Result;

#[derive(Debug, Clone)]
pub struct RerankedDocument {
    pub index: usize,
    pub relevance_score: f32,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    async fn rerank(
        &self,
        model: &str,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankedDocument>>;
}
