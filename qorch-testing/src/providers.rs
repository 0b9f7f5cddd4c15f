//! Deterministic `Embedder`/`Reranker` fakes for the hybrid-retriever test
//! suite (S6 and the RRF/BM25 property tests): no network access, no
//! randomness, so a vector search over these embeddings is reproducible.

use async_trait::async_trait;
use qorch_core::Result;
use qorch_providers::embedder::{Embedder, InputType};
use qorch_providers::reranker::{RerankedDocument, Reranker};

/// Embeds each text as a tiny hash-derived vector. Not semantically
/// meaningful, but stable across calls and distinguishes distinct inputs,
/// which is all the vector-store half of the hybrid retriever needs in
/// tests that assert on rank/fusion behavior rather than relevance.
pub struct FakeEmbedder {
    dims: usize,
}

impl FakeEmbedder {
    #[must_use]
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % self.dims] += f32::from(byte) / 255.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn name(&self) -> &str {
        "fake-embedder"
    }

    async fn embed(&self, texts: &[String], _model: &str, _input_type: InputType) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Reranks by a fixed scripted score per document index, or (if no score
/// is scripted for that many documents) by a length heuristic, so tests
/// can assert the rerank pass actually changed ordering.
pub struct FakeReranker {
    scores: Option<Vec<f32>>,
}

impl FakeReranker {
    #[must_use]
    pub fn scoring_by_length() -> Self {
        Self { scores: None }
    }

    #[must_use]
    pub fn with_scores(scores: Vec<f32>) -> Self {
        Self { scores: Some(scores) }
    }
}

#[async_trait]
impl Reranker for FakeReranker {
    fn name(&self) -> &str {
        "fake-reranker"
    }

    async fn rerank(&self, _model: &str, _query: &str, documents: &[String], top_n: usize) -> Result<Vec<RerankedDocument>> {
        let mut scored: Vec<RerankedDocument> = documents
            .iter()
            .enumerate()
            .map(|(index, doc)| {
                let relevance_score = self
                    .scores
                    .as_ref()
                    .and_then(|s| s.get(index).copied())
                    .unwrap_or_else(|| doc.len() as f32);
                RerankedDocument { index, relevance_score }
            })
            .collect();
        scored.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_n);
        Ok(scored)
    }
}
