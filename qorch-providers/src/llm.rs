//! The LLM collaborator surface: `generate`, with an optional streaming
//! variant, plus the token-usage accounting the Orchestrator's vision-path
//! cost estimate and the Planner's `return_token_info` option both need.

use async_trait::async_trait;
use qorch_core::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl From<Usage> for qorch_core::model::Usage {
    fn from(u: Usage) -> Self {
        Self {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

/// Options accepted by `LlmProvider::generate`. `return_token_info`
/// mirrors the specification's named option for obtaining `Usage`.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub return_token_info: bool,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    pub usage: Option<Usage>,
}

/// A streamed completion chunk.
#[derive(Debug, Clone)]
pub struct GenerationChunk {
    pub delta: String,
    pub done: bool,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// A stable provider name (`"openai"`, `"anthropic"`, `"fallback(...)"`),
    /// used in logging and in `FallbackProvider`'s composed name.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<GenerationResult>;

    /// Streaming variant; the default implementation synthesizes a single
    /// terminal chunk from `generate` so callers can always stream,
    /// matching the specification's "stream variant yields chunks"
    /// without forcing every provider to implement true token streaming.
    async fn generate_stream(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Vec<GenerationChunk>> {
        let result = self.generate(prompt, options).await?;
        Ok(vec![GenerationChunk {
            delta: result.text,
            done: true,
        }])
    }
}
