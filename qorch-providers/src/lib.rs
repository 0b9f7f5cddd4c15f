//! LLM, embedding, and reranker collaborator traits plus a `rig-core`-backed
//! implementation and a business-error-aware fallback wrapper.
//!
//! None of these are part of the orchestration core proper (section 1 calls
//! out embedding-model selection as a Non-goal); this crate only needs to
//! satisfy the interfaces `qorch-retriever`, `qorch-orchestrator`, and
//! `qorch-research` call through.

pub mod embedder;
pub mod fallback;
pub mod llm;
pub mod reranker;
pub mod rig_provider;

pub use embedder::{Embedder, InputType};
pub use fallback::FallbackProvider;
pub use llm::{GenerationOptions, GenerationResult, LlmProvider, Usage};
pub use reranker::{Reranker, RerankedDocument};
pub use rig_provider::RigLlmProvider;
