//! Minimal vector store, satisfying `qorch-retriever`'s dense-search half.
//!
//! The specification's vector-store collaborator names named collections,
//! metadata-filtered queries, and scroll/delete operations; it does not
//! mandate an indexing algorithm. This crate provides a brute-force
//! in-memory implementation, sufficient for the corpora the hybrid
//! retriever is specified against (the BM25 half already caps at 1,000
//! documents). A production deployment can swap in an ANN-backed
//! implementation of the same trait without touching `qorch-retriever`.

use std::collections::HashMap;

use parking_lot::RwLock;
use qorch_core::{Error, Result};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    Cosine,
    Dot,
    Euclidean,
}

#[derive(Debug, Clone)]
pub struct CollectionConfig {
    pub vector_size: usize,
    pub distance: Distance,
}

#[derive(Debug, Clone)]
pub struct Point {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub vector: Option<Vec<f32>>,
    pub payload: Value,
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct CollectionStats {
    pub point_count: usize,
}

/// A metadata filter: for each key, either one required value or a
/// disjunction of acceptable values (`OR` across the list).
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub must: HashMap<String, Vec<Value>>,
}

impl Filter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, values: Vec<Value>) -> Self {
        self.must.insert(key.into(), values);
        self
    }

    fn matches(&self, payload: &Value) -> bool {
        self.must.iter().all(|(key, allowed)| {
            payload
                .get(key)
                .is_some_and(|actual| allowed.iter().any(|v| v == actual))
        })
    }
}

pub trait VectorBackend: Send + Sync {
    fn create_collection(&self, name: &str, config: CollectionConfig) -> Result<()>;

    fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()>;

    fn query_points(
        &self,
        collection: &str,
        query_vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    fn scroll(
        &self,
        collection: &str,
        offset: usize,
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<(Vec<Point>, Option<usize>)>;

    fn delete(&self, collection: &str, ids: &[String]) -> Result<()>;

    fn get_collection(&self, name: &str) -> Result<CollectionStats>;
}

struct Collection {
    config: CollectionConfig,
    points: Vec<Point>,
}

/// Brute-force in-memory `VectorBackend`. Deterministic and dependency-free,
/// which is what the test suite (S6, hybrid-retriever property tests) and
/// local development need; not intended to scale past the corpora the
/// specification's BM25 cap already bounds.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn score(distance: Distance, a: &[f32], b: &[f32]) -> f32 {
        match distance {
            Distance::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    0.0
                } else {
                    dot / (norm_a * norm_b)
                }
            }
            Distance::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Distance::Euclidean => {
                let sum_sq: f32 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
                -sum_sq.sqrt()
            }
        }
    }
}

impl VectorBackend for InMemoryVectorStore {
    fn create_collection(&self, name: &str, config: CollectionConfig) -> Result<()> {
        self.collections.write().insert(
            name.to_string(),
            Collection {
                config,
                points: Vec::new(),
            },
        );
        Ok(())
    }

    fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| Error::storage(format!("collection '{collection}' not found")))?;
        for point in points {
            if let Some(existing) = coll.points.iter_mut().find(|p| p.id == point.id) {
                *existing = point;
            } else {
                coll.points.push(point);
            }
        }
        Ok(())
    }

    fn query_points(
        &self,
        collection: &str,
        query_vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read();
        let coll = collections
            .get(collection)
            .ok_or_else(|| Error::storage(format!("collection '{collection}' not found")))?;

        let mut scored: Vec<ScoredPoint> = coll
            .points
            .iter()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload)))
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                vector: None,
                payload: p.payload.clone(),
                score: Self::score(coll.config.distance, query_vector, &p.vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    fn scroll(
        &self,
        collection: &str,
        offset: usize,
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<(Vec<Point>, Option<usize>)> {
        let collections = self.collections.read();
        let coll = collections
            .get(collection)
            .ok_or_else(|| Error::storage(format!("collection '{collection}' not found")))?;

        let filtered: Vec<Point> = coll
            .points
            .iter()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload)))
            .cloned()
            .collect();

        let page: Vec<Point> = filtered.iter().skip(offset).take(limit).cloned().collect();
        let next_offset = if offset + page.len() < filtered.len() {
            Some(offset + page.len())
        } else {
            None
        };
        Ok((page, next_offset))
    }

    fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| Error::storage(format!("collection '{collection}' not found")))?;
        coll.points.retain(|p| !ids.contains(&p.id));
        Ok(())
    }

    fn get_collection(&self, name: &str) -> Result<CollectionStats> {
        let collections = self.collections.read();
        let coll = collections
            .get(name)
            .ok_or_else(|| Error::storage(format!("collection '{name}' not found")))?;
        Ok(CollectionStats {
            point_count: coll.points.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point(id: &str, vector: Vec<f32>, file_name: &str) -> Point {
        Point {
            id: id.to_string(),
            vector,
            payload: json!({ "file_name": file_name }),
        }
    }

    #[test]
    fn query_points_ranks_by_cosine_similarity() {
        let store = InMemoryVectorStore::new();
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
                    point("a", vec![1.0, 0.0], "a.pdf"),
                    point("b", vec![0.0, 1.0], "b.pdf"),
                ],
            )
            .unwrap();

        let results = store
            .query_points("docs", &[1.0, 0.0], None, 2)
            .unwrap();
        assert_eq!(results[0].id, "a");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn query_points_respects_filter() {
        let store = InMemoryVectorStore::new();
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
                    point("a", vec![1.0, 0.0], "a.pdf"),
                    point("b", vec![1.0, 0.0], "b.pdf"),
                ],
            )
            .unwrap();

        let filter = Filter::new().with("file_name", vec![json!("b.pdf")]);
        let results = store
            .query_points("docs", &[1.0, 0.0], Some(&filter), 10)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }

    #[test]
    fn scroll_paginates() {
        let store = InMemoryVectorStore::new();
        store
            .create_collection(
                "docs",
                CollectionConfig {
                    vector_size: 1,
                    distance: Distance::Cosine,
                },
            )
            .unwrap();
        store
            .upsert(
                "docs",
                (0..5)
                    .map(|i| point(&i.to_string(), vec![1.0], "f.pdf"))
                    .collect(),
            )
            .unwrap();

        let (page, next) = store.scroll("docs", 0, 2, None).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(next, Some(2));

        let (page, next) = store.scroll("docs", 4, 2, None).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(next, None);
    }
}
