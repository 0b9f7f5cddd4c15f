//! A multi-provider `LlmProvider` wrapper: tries each inner provider in
//! order, moving to the next only on a retryable transport error. Business
//! errors (invalid input, a provider's own validation) do not trigger
//! fallback, matching the specification's "business errors do not trigger
//! fallback" rule for the LLM collaborator.

use async_trait::async_trait;
use qorch_core::{Error, Result};
use tracing::warn;

use crate::llm::{GenerationChunk, GenerationOptions, GenerationResult, LlmProvider};

pub struct FallbackProvider {
    name: String,
    providers: Vec<Box<dyn LlmProvider>>,
}

impl FallbackProvider {
    #[must_use]
    pub fn new(providers: Vec<Box<dyn LlmProvider>>) -> Self {
        let name = format!(
            "fallback({})",
            providers
                .iter()
                .map(|p| p.name())
                .collect::<Vec<_>>()
                .join(",")
        );
        Self { name, providers }
    }
}

#[async_trait]
impl LlmProvider for FallbackProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<GenerationResult> {
        if self.providers.is_empty() {
            return Err(Error::configuration("no LLM providers configured"));
        }

        let mut last_err = None;
        for provider in &self.providers {
            match provider.generate(prompt, options).await {
                Ok(result) => return Ok(result),
                Err(err) if err.is_retryable() => {
                    warn!(provider = provider.name(), error = %err, "provider failed, trying next");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::configuration("no LLM providers configured")))
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Vec<GenerationChunk>> {
        if self.providers.is_empty() {
            return Err(Error::configuration("no LLM providers configured"));
        }

        let mut last_err = None;
        for provider in &self.providers {
            match provider.generate_stream(prompt, options).await {
                Ok(chunks) => return Ok(chunks),
                Err(err) if err.is_retryable() => {
                    warn!(provider = provider.name(), error = %err, "provider failed, trying next");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::configuration("no LLM providers configured")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedProvider {
        name: String,
        calls: Arc<AtomicUsize>,
        outcome: fn() -> Result<GenerationResult>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<GenerationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    #[tokio::test]
    async fn falls_back_on_transient_error() {
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));
        let first = ScriptedProvider {
            name: "primary".into(),
            calls: first_calls.clone(),
            outcome: || {
                Err(Error::TransientTransport {
                    origin: "primary".into(),
                    message: "connection reset".into(),
                })
            },
        };
        let second = ScriptedProvider {
            name: "secondary".into(),
            calls: second_calls.clone(),
            outcome: || {
                Ok(GenerationResult {
                    text: "ok".into(),
                    usage: None,
                })
            },
        };
        let fallback = FallbackProvider::new(vec![Box::new(first), Box::new(second)]);

        let result = fallback
            .generate("hi", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(result.text, "ok");
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn business_errors_do_not_trigger_fallback() {
        let second_calls = Arc::new(AtomicUsize::new(0));
        let first = ScriptedProvider {
            name: "primary".into(),
            calls: Arc::new(AtomicUsize::new(0)),
            outcome: || Err(Error::business("invalid request")),
        };
        let second = ScriptedProvider {
            name: "secondary".into(),
            calls: second_calls.clone(),
            outcome: || {
                Ok(GenerationResult {
                    text: "ok".into(),
                    usage: None,
                })
            },
        };
        let fallback = FallbackProvider::new(vec![Box::new(first), Box::new(second)]);

        let result = fallback.generate("hi", &GenerationOptions::default()).await;
        assert!(matches!(result, Err(Error::BusinessError { .. })));
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }
}
