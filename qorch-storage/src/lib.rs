//! Durable backing stores for the orchestration core.
//!
//! Two independent concerns live here: an opaque key/value store with TTL
//! (`kv::KvBackend`), used by the Context Store (`qorch-context`) to persist
//! serialized `Context`s and by the Deep-Research Workflow to persist
//! `ResearchTask`s; and a minimal vector store (`vector::VectorBackend`),
//! used by `qorch-retriever` for the dense half of hybrid search. Both are
//! trait objects so the core never hard-codes a backend: the in-memory
//! implementations back tests and local runs, `kv::SqliteKv` is the one
//! concrete durable backend named in the specification.

pub mod kv;
pub mod vector;

pub use kv::KvBackend;
pub use vector::VectorBackend;
