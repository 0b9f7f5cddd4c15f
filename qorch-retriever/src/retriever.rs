//! The hybrid retriever: fuses a dense vector-store query and an in-memory
//! BM25 query over the same filtered corpus via Reciprocal Rank Fusion, then
//! optionally re-ranks the fused candidates.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use qorch_config::RetrieverSettings;
use qorch_core::model::{Chunk, ChunkMetadata, SearchInfo, SearchSource};
use qorch_core::{Error as CoreError, Result};
use qorch_providers::embedder::{Embedder, InputType};
use qorch_providers::reranker::Reranker;
use qorch_storage::vector::{Filter, Point, ScoredPoint, VectorBackend};
use tracing::warn;

use crate::bm25::{Bm25Config, Bm25Index};
use crate::rrf;

/// The result of fusing and deduplicating several `search` queries, e.g. for
/// the sub-question retrieval step of the deep-research workflow.
#[derive(Debug, Clone, Default)]
pub struct MultiSearchResult {
    pub chunks: Vec<Chunk>,
}

struct CachedIndex {
    fingerprint: u64,
    index: Bm25Index,
}

pub struct HybridRetriever {
    vector_store: Arc<dyn VectorBackend>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    settings: RetrieverSettings,
    collection: String,
    embedding_model: String,
    rerank_model: String,
    bm25_cache: Mutex<Option<CachedIndex>>,
}

fn point_to_chunk(id: &str, score: f32, payload: &serde_json::Value) -> Result<Chunk> {
    let text = payload
        .get("text")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CoreError::storage("chunk payload missing 'text'"))?
        .to_string();
    let file_name = payload
        .get("file_name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let page_label = payload
        .get("page_label")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let chunk_index = payload
        .get("chunk_index")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0) as usize;
    let content_type = payload
        .get("content_type")
        .and_then(|v| v.as_str())
        .unwrap_or("text/plain")
        .to_string();

    Ok(Chunk {
        id: id.to_string(),
        text,
        metadata: ChunkMetadata {
            file_name,
            page_label,
            chunk_index,
            content_type,
        },
        score,
        search_info: SearchInfo {
            vector_rank: None,
            bm25_rank: None,
            rrf_score: 0.0,
            rerank_score: None,
            source: SearchSource::Vector,
        },
    })
}

impl HybridRetriever {
    #[must_use]
    pub fn new(
        vector_store: Arc<dyn VectorBackend>,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
        settings: RetrieverSettings,
        collection: impl Into<String>,
        embedding_model: impl Into<String>,
        rerank_model: impl Into<String>,
    ) -> Self {
        Self {
            vector_store,
            embedder,
            reranker,
            settings,
            collection: collection.into(),
            embedding_model: embedding_model.into(),
            rerank_model: rerank_model.into(),
            bm25_cache: Mutex::new(None),
        }
    }

    fn fingerprint(&self, filter: Option<&Filter>, point_count: usize) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.collection.hash(&mut hasher);
        point_count.hash(&mut hasher);
        format!("{filter:?}").hash(&mut hasher);
        hasher.finish()
    }

    /// Runs a BM25 search over the whole (optionally filtered) collection,
    /// reusing the cached index if the collection size and filter are
    /// unchanged since the last build, and rebuilding it otherwise.
    fn bm25_search_scored(&self, query: &str, filter: Option<&Filter>, limit: usize) -> Result<Vec<(String, f32)>> {
        let stats = self.vector_store.get_collection(&self.collection)?;
        let fingerprint = self.fingerprint(filter, stats.point_count);

        let mut cache = self.bm25_cache.lock();
        let needs_rebuild = cache.as_ref().map_or(true, |c| c.fingerprint != fingerprint);
        if needs_rebuild {
            let corpus = self.scan_corpus(filter)?;
            let index = Bm25Index::build(&corpus, self.bm25_config());
            *cache = Some(CachedIndex { fingerprint, index });
        }

        Ok(cache.as_ref().expect("just populated above").index.search(query, limit))
    }

    fn bm25_config(&self) -> Bm25Config {
        Bm25Config {
            k1: self.settings.bm25_k1,
            b: self.settings.bm25_b,
        }
    }

    fn scan_corpus(&self, filter: Option<&Filter>) -> Result<Vec<(String, String)>> {
        let mut corpus = Vec::new();
        let mut offset = 0usize;
        const PAGE: usize = 200;
        loop {
            let (points, next) = self
                .vector_store
                .scroll(&self.collection, offset, PAGE, filter)?;
            for point in &points {
                if let Some(text) = point.payload.get("text").and_then(|v| v.as_str()) {
                    corpus.push((point.id.clone(), text.to_string()));
                }
            }
            match next {
                Some(n) if corpus.len() < crate::bm25::INDEX_CAP => offset = n,
                _ => break,
            }
        }
        Ok(corpus)
    }

    async fn vector_search(
        &self,
        query: &str,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<Chunk>> {
        let embedding = self
            .embedder
            .embed(
                &[query.to_string()],
                &self.embedding_model,
                InputType::SearchQuery,
            )
            .await?;
        let query_vector = embedding
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::business("embedder returned no vector for query"))?;

        let scored: Vec<ScoredPoint> =
            self.vector_store
                .query_points(&self.collection, &query_vector, filter, limit)?;

        scored
            .into_iter()
            .map(|p| point_to_chunk(&p.id, p.score, &p.payload))
            .collect()
    }

    fn bm25_search(&self, query: &str, filter: Option<&Filter>, limit: usize) -> Result<Vec<Chunk>> {
        let hits = self.bm25_search_scored(query, filter, limit)?;
        let mut chunks = Vec::with_capacity(hits.len());
        for (id, score) in hits {
            if let Some(point) = self.fetch_point(&id)? {
                chunks.push(point_to_chunk(&point.id, score, &point.payload)?);
            }
        }
        Ok(chunks)
    }

    fn fetch_point(&self, id: &str) -> Result<Option<Point>> {
        let mut offset = 0usize;
        const PAGE: usize = 200;
        loop {
            let (points, next) = self
                .vector_store
                .scroll(&self.collection, offset, PAGE, None)?;
            if let Some(found) = points.into_iter().find(|p| p.id == id) {
                return Ok(Some(found));
            }
            match next {
                Some(n) => offset = n,
                None => return Ok(None),
            }
        }
    }

    /// Runs the dense + BM25 + RRF pipeline for a single query, optionally
    /// re-ranking the fused candidates. Retrieval failures (embedding,
    /// vector-store, rerank) are logged and degrade to an empty result
    /// rather than failing the caller, per the retriever's error contract.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&Filter>,
        use_rerank: bool,
    ) -> Vec<Chunk> {
        match self.try_search(query, top_k, filter, use_rerank).await {
            Ok(chunks) => chunks,
            Err(err) => {
                warn!(error = %err, query, "retrieval failed, returning empty result set");
                Vec::new()
            }
        }
    }

    async fn try_search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&Filter>,
        use_rerank: bool,
    ) -> Result<Vec<Chunk>> {
        let factor = if use_rerank {
            self.settings.rerank_factor
        } else {
            self.settings.no_rerank_factor
        };
        let candidate_limit = top_k.saturating_mul(factor.max(1));

        let vector_results = self.vector_search(query, filter, candidate_limit).await?;
        let bm25_results = self.bm25_search(query, filter, candidate_limit)?;

        let mut fused = rrf::fuse(vector_results, bm25_results, self.settings.rrf_k);
        fused.truncate(candidate_limit);

        if use_rerank {
            if let Some(reranker) = &self.reranker {
                fused = self.rerank(reranker.as_ref(), query, fused).await?;
            }
        }

        fused.truncate(top_k);
        Ok(fused)
    }

    async fn rerank(
        &self,
        reranker: &dyn Reranker,
        query: &str,
        mut chunks: Vec<Chunk>,
    ) -> Result<Vec<Chunk>> {
        let documents: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let reranked = reranker
            .rerank(&self.rerank_model, query, &documents, chunks.len())
            .await?;

        for doc in &reranked {
            if let Some(chunk) = chunks.get_mut(doc.index) {
                chunk.search_info.rerank_score = Some(doc.relevance_score);
                chunk.score = doc.relevance_score;
            }
        }
        chunks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(chunks)
    }

    /// Runs `search` for each of `queries` and merges the results,
    /// deduplicating by fusion key so the same passage surfaced by more
    /// than one sub-question appears once, ordered by best score seen.
    pub async fn search_multiple(
        &self,
        queries: &[String],
        top_k_per_query: usize,
        filter: Option<&Filter>,
        use_rerank: bool,
    ) -> MultiSearchResult {
        let mut seen = std::collections::HashSet::new();
        let mut merged = Vec::new();

        for query in queries {
            let chunks = self.search(query, top_k_per_query, filter, use_rerank).await;
            for chunk in chunks {
                if seen.insert(chunk.fusion_key()) {
                    merged.push(chunk);
                }
            }
        }

        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        MultiSearchResult { chunks: merged }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qorch_storage::vector::{CollectionConfig, Distance, InMemoryVectorStore};
    use serde_json::json;

    struct StubEmbedder;

    #[async_trait::async_trait]
    impl Embedder for StubEmbedder {
        fn name(&self) -> &str {
            "stub"
        }

        async fn embed(
            &self,
            texts: &[String],
            _model: &str,
            _input_type: InputType,
        ) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn make_store() -> Arc<InMemoryVectorStore> {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .create_collection(
                "docs",
                CollectionConfig {
                    vector_size: 2,
                    distance: Distance::Cosine,
                },
            )
            .unwrap();
        store
            .upsert(
                "docs",
                vec![
                    Point {
                        id: "1".to_string(),
                        vector: vec![1.0, 0.0],
                        payload: json!({"text": "retrieval augmented generation overview", "file_name": "a.txt"}),
                    },
                    Point {
                        id: "2".to_string(),
                        vector: vec![0.0, 1.0],
                        payload: json!({"text": "a completely unrelated cooking recipe", "file_name": "b.txt"}),
                    },
                ],
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn search_returns_best_matching_chunk_first() {
        let retriever = HybridRetriever::new(
            make_store(),
            Arc::new(StubEmbedder),
            None,
            RetrieverSettings::default(),
            "docs",
            "embed-model",
            "rerank-model",
        );

        let results = retriever.search("retrieval augmented generation", 5, None, false).await;
        assert!(!results.is_empty());
        assert_eq!(results[0].id, "1");
    }

    #[tokio::test]
    async fn search_multiple_deduplicates_by_fusion_key() {
        let retriever = HybridRetriever::new(
            make_store(),
            Arc::new(StubEmbedder),
            None,
            RetrieverSettings::default(),
            "docs",
            "embed-model",
            "rerank-model",
        );

        let result = retriever
            .search_multiple(
                &["retrieval augmented generation".to_string(), "generation overview".to_string()],
                5,
                None,
                false,
            )
            .await;

        let unique: std::collections::HashSet<_> = result.chunks.iter().map(Chunk::fusion_key).collect();
        assert_eq!(unique.len(), result.chunks.len());
    }
}
