//! A scriptable `LlmProvider` fake: configured with a fixed sequence of
//! outcomes, consumed one per `generate` call and holding at the last
//! entry once exhausted, so a test can express "fail twice then
//! succeed" or "always fail" without a mocking framework.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use qorch_core::{Error, Result};
use qorch_providers::llm::{GenerationOptions, GenerationResult, LlmProvider, Usage};

#[derive(Clone)]
enum Outcome {
    Text(String),
    TransientFailure(String),
    BusinessFailure(String),
}

/// Scripted `LlmProvider`. Use [`FakeLlmProvider::responding`] for a
/// single canned answer, [`FakeLlmProvider::failing_then_succeeding`] for
/// the circuit-breaker/retry tests, or [`FakeLlmProvider::always_failing`]
/// for the Planner's JSON-parse-failure fallback path (S4).
pub struct FakeLlmProvider {
    name: String,
    script: Vec<Outcome>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlmProvider {
    #[must_use]
    pub fn responding(text: impl Into<String>) -> Self {
        Self::scripted("fake-llm", vec![Outcome::Text(text.into())])
    }

    #[must_use]
    pub fn responding_json(json: impl Into<String>) -> Self {
        Self::responding(json)
    }

    /// Invalid (non-JSON) planner output, exercising the rule-based
    /// fallback path (specification scenario S4).
    #[must_use]
    pub fn responding_non_json() -> Self {
        Self::responding("not json at all, sorry")
    }

    #[must_use]
    pub fn failing_then_succeeding(failures: usize, success_text: impl Into<String>) -> Self {
        let mut script: Vec<Outcome> = (0..failures)
            .map(|i| Outcome::TransientFailure(format!("simulated transient failure #{i}")))
            .collect();
        script.push(Outcome::Text(success_text.into()));
        Self::scripted("fake-llm-flaky", script)
    }

    #[must_use]
    pub fn always_failing(message: impl Into<String>) -> Self {
        Self::scripted("fake-llm-down", vec![Outcome::TransientFailure(message.into())])
    }

    #[must_use]
    pub fn always_business_failing(message: impl Into<String>) -> Self {
        Self::scripted("fake-llm-rejecting", vec![Outcome::BusinessFailure(message.into())])
    }

    fn scripted(name: &str, script: Vec<Outcome>) -> Self {
        Self {
            name: name.to_string(),
            script,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn prompts_seen(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for FakeLlmProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<GenerationResult> {
        self.prompts.lock().push(prompt.to_string());
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let slot = self.script.get(index).or_else(|| self.script.last());

        match slot {
            Some(Outcome::Text(text)) => Ok(GenerationResult {
                text: text.clone(),
                usage: Some(Usage {
                    prompt_tokens: prompt.len() as u32,
                    completion_tokens: text.len() as u32,
                    total_tokens: (prompt.len() + text.len()) as u32,
                }),
            }),
            Some(Outcome::TransientFailure(message)) => Err(Error::TransientTransport {
                origin: self.name.clone(),
                message: message.clone(),
            }),
            Some(Outcome::BusinessFailure(message)) => Err(Error::business(message.clone())),
            None => Ok(GenerationResult {
                text: String::new(),
                usage: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responding_returns_the_same_text_every_call() {
        let llm = FakeLlmProvider::responding("hello");
        let first = llm.generate("q1", &GenerationOptions::default()).await.unwrap();
        let second = llm.generate("q2", &GenerationOptions::default()).await.unwrap();
        assert_eq!(first.text, "hello");
        assert_eq!(second.text, "hello");
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn failing_then_succeeding_fails_exactly_n_times() {
        let llm = FakeLlmProvider::failing_then_succeeding(2, "recovered");
        assert!(llm.generate("p", &GenerationOptions::default()).await.is_err());
        assert!(llm.generate("p", &GenerationOptions::default()).await.is_err());
        let ok = llm.generate("p", &GenerationOptions::default()).await.unwrap();
        assert_eq!(ok.text, "recovered");
    }
}
