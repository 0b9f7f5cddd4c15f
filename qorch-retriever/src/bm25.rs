//! An in-memory BM25 index, rebuilt lazily per filter fingerprint and
//! capped at 1,000 documents to bound memory (a known scalability ceiling
//! inherited from the specification; a larger corpus should replace this
//! with a proper inverted-index store without changing the fusion
//! contract `qorch_core::model::SearchInfo` exposes).

use std::collections::HashMap;

use crate::tokenizer::tokenize;

#[derive(Debug, Clone, Copy)]
pub struct Bm25Config {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

pub const INDEX_CAP: usize = 1000;

struct Document {
    id: String,
    term_freqs: HashMap<String, u32>,
    length: usize,
}

/// A document-frequency-indexed, in-memory BM25 corpus snapshot.
pub struct Bm25Index {
    config: Bm25Config,
    documents: Vec<Document>,
    doc_freq: HashMap<String, usize>,
    avg_doc_len: f32,
}

impl Bm25Index {
    /// Builds an index over `corpus` (doc id, document text), truncating to
    /// `INDEX_CAP` documents if the corpus is larger.
    #[must_use]
    pub fn build(corpus: &[(String, String)], config: Bm25Config) -> Self {
        let corpus = &corpus[..corpus.len().min(INDEX_CAP)];

        let mut documents = Vec::with_capacity(corpus.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;

        for (id, text) in corpus {
            let tokens = tokenize(text);
            total_len += tokens.len();
            let mut term_freqs = HashMap::new();
            for token in &tokens {
                *term_freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in term_freqs.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            documents.push(Document {
                id: id.clone(),
                length: tokens.len(),
                term_freqs,
            });
        }

        let avg_doc_len = if documents.is_empty() {
            0.0
        } else {
            total_len as f32 / documents.len() as f32
        };

        Self {
            config,
            documents,
            doc_freq,
            avg_doc_len,
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.documents.len() as f32;
        let df = *self.doc_freq.get(term).unwrap_or(&0) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Scores every document against `query`, returning `(doc_id, score)`
    /// pairs sorted by score descending, truncated to `top_k`.
    #[must_use]
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(String, f32)> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || self.documents.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(String, f32)> = self
            .documents
            .iter()
            .map(|doc| {
                let score: f32 = query_terms
                    .iter()
                    .map(|term| {
                        let freq = *doc.term_freqs.get(term).unwrap_or(&0) as f32;
                        if freq == 0.0 {
                            return 0.0;
                        }
                        let idf = self.idf(term);
                        let numerator = freq * (self.config.k1 + 1.0);
                        let denominator = freq
                            + self.config.k1
                                * (1.0 - self.config.b
                                    + self.config.b * doc.length as f32 / self.avg_doc_len.max(1.0));
                        idf * numerator / denominator
                    })
                    .sum();
                (doc.id.clone(), score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }
}
