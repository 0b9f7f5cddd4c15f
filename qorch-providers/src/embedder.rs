//! The embedding collaborator surface used by `qorch-retriever`'s dense
//! half: `embed(texts, model, input_type)`.

use async_trait::async_trait;
use qorch_core::Result;

/// Whether a vector is being produced for a query or for a stored document.
/// Providers that don't distinguish the two (the common case) accept either
/// value and embed identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    SearchQuery,
    SearchDocument,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(
        &self,
        texts: &[String],
        model: &str,
        input_type: InputType,
    ) -> Result<Vec<Vec<f32>>>;
}
