//! Reciprocal Rank Fusion: merges a dense vector-search ranking and a BM25
//! ranking into one list, keyed by `Chunk::fusion_key` (the first 100
//! characters of chunk text) rather than chunk id, so the same passage
//! retrieved by both paths under different ids still fuses into one entry.

use qorch_core::model::{Chunk, SearchInfo, SearchSource};
use std::collections::HashMap;

pub const DEFAULT_K: f32 = 60.0;

struct Fused {
    chunk: Chunk,
    vector_rank: Option<usize>,
    bm25_rank: Option<usize>,
}

/// Fuses two rank-ordered chunk lists (best first) into one, deduplicated by
/// fusion key, sorted by descending RRF score. Running `fuse` again on the
/// output of a prior fusion (after re-sorting by score into two identical
/// rankings) reproduces the same order, matching the idempotence property
/// tested below.
#[must_use]
pub fn fuse(vector_ranked: Vec<Chunk>, bm25_ranked: Vec<Chunk>, k: f32) -> Vec<Chunk> {
    let mut order: Vec<String> = Vec::new();
    let mut fused: HashMap<String, Fused> = HashMap::new();

    for (rank, chunk) in vector_ranked.into_iter().enumerate() {
        let key = chunk.fusion_key();
        order.push(key.clone());
        fused.entry(key).or_insert(Fused {
            chunk,
            vector_rank: Some(rank),
            bm25_rank: None,
        });
    }

    for (rank, chunk) in bm25_ranked.into_iter().enumerate() {
        let key = chunk.fusion_key();
        match fused.get_mut(&key) {
            Some(entry) => entry.bm25_rank = Some(rank),
            None => {
                order.push(key.clone());
                fused.insert(
                    key,
                    Fused {
                        chunk,
                        vector_rank: None,
                        bm25_rank: Some(rank),
                    },
                );
            }
        }
    }

    let mut results: Vec<Chunk> = order
        .into_iter()
        .filter_map(|key| fused.remove(&key))
        .map(|entry| {
            let vector_term = entry.vector_rank.map_or(0.0, |r| 1.0 / (k + r as f32 + 1.0));
            let bm25_term = entry.bm25_rank.map_or(0.0, |r| 1.0 / (k + r as f32 + 1.0));
            let rrf_score = vector_term + bm25_term;

            let source = match (entry.vector_rank, entry.bm25_rank) {
                (Some(_), Some(_)) => SearchSource::Hybrid,
                (Some(_), None) => SearchSource::Vector,
                (None, Some(_)) => SearchSource::Bm25,
                (None, None) => SearchSource::Hybrid,
            };

            let mut chunk = entry.chunk;
            chunk.score = rrf_score;
            chunk.search_info = SearchInfo {
                vector_rank: entry.vector_rank,
                bm25_rank: entry.bm25_rank,
                rrf_score,
                rerank_score: None,
                source,
            };
            chunk
        })
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use qorch_core::model::ChunkMetadata;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            metadata: ChunkMetadata {
                file_name: "doc.txt".to_string(),
                page_label: None,
                chunk_index: 0,
                content_type: "text/plain".to_string(),
            },
            score: 0.0,
            search_info: SearchInfo {
                vector_rank: None,
                bm25_rank: None,
                rrf_score: 0.0,
                rerank_score: None,
                source: SearchSource::Vector,
            },
        }
    }

    #[test]
    fn chunk_ranked_in_both_lists_outranks_single_list_hits() {
        let vector = vec![chunk("a", "alpha passage"), chunk("b", "beta passage")];
        let bm25 = vec![chunk("b", "beta passage"), chunk("c", "gamma passage")];

        let fused = fuse(vector, bm25, DEFAULT_K);

        assert_eq!(fused[0].id, "b");
        assert_eq!(fused[0].search_info.source, SearchSource::Hybrid);
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn fusing_identical_single_list_is_idempotent() {
        let vector = vec![chunk("a", "alpha"), chunk("b", "beta"), chunk("c", "gamma")];
        let first = fuse(vector.clone(), Vec::new(), DEFAULT_K);
        let second = fuse(first.clone(), Vec::new(), DEFAULT_K);
        let first_ids: Vec<&str> = first.iter().map(|c| c.id.as_str()).collect();
        let second_ids: Vec<&str> = second.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn empty_inputs_produce_empty_output() {
        assert!(fuse(Vec::new(), Vec::new(), DEFAULT_K).is_empty());
    }
}
