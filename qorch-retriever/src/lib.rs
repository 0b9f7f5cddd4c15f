//! The hybrid dense + BM25 retriever: the knowledge substrate behind the
//! `rag_search*`/`rag_ask` tools. Combines a vector-store nearest-neighbor
//! search with an in-memory BM25 index over the same filtered corpus via
//! Reciprocal Rank Fusion, with an optional neural re-ranking pass.

pub mod bm25;
pub mod error;
pub mod retriever;
pub mod rrf;
pub mod tokenizer;

pub use error::Error;
pub use qorch_config::RetrieverSettings;
pub use retriever::{HybridRetriever, MultiSearchResult};
