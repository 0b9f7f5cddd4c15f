//! Wraps `rig-core` to provide LLM completions, grounded on the teacher
//! workspace's own `rig`-backed provider: one `RigModel` per vendor, a
//! `match` on the configured provider name at construction, and errors
//! mapped into `qorch_core::Error::TransientTransport` (rig's transport
//! failures are the retryable kind the Executor is specified to retry).

use async_trait::async_trait;
use qorch_core::{Error, Result};
use rig::completion::CompletionModel;
use rig::providers;

use crate::llm::{GenerationOptions, GenerationResult, LlmProvider};

enum RigModel {
    OpenAi(providers::openai::CompletionModel),
    Anthropic(providers::anthropic::completion::CompletionModel),
}

/// A `rig-core`-backed `LlmProvider`. Construct one per configured vendor;
/// compose several behind `FallbackProvider` for the multi-provider wrapper
/// the specification describes.
pub struct RigLlmProvider {
    provider_name: String,
    model_name: String,
    model: RigModel,
}

impl RigLlmProvider {
    /// `provider` is `"openai"` or `"anthropic"`; `api_key` and `model`
    /// select the vendor credential and completion model respectively.
    pub fn new(provider: &str, api_key: &str, model: &str) -> Result<Self> {
        let rig_model = match provider {
            "openai" => {
                let client = providers::openai::Client::new(api_key);
                RigModel::OpenAi(client.completion_model(model))
            }
            "anthropic" => {
                let client = providers::anthropic::Client::new(
                    api_key,
                    "https://api.anthropic.com",
                    None,
                    "2023-06-01",
                );
                RigModel::Anthropic(client.completion_model(model))
            }
            other => {
                return Err(Error::configuration(format!(
                    "unsupported LLM provider '{other}'"
                )));
            }
        };
        Ok(Self {
            provider_name: provider.to_string(),
            model_name: model.to_string(),
            model: rig_model,
        })
    }
}

#[async_trait]
impl LlmProvider for RigLlmProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<GenerationResult> {
        let mut request = match &self.model {
            RigModel::OpenAi(model) => model.completion_request(prompt),
            RigModel::Anthropic(model) => model.completion_request(prompt),
        };
        if let Some(system) = &options.system_prompt {
            request = request.preamble(system.clone());
        }
        if let Some(temperature) = options.temperature {
            request = request.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = options.max_tokens {
            request = request.max_tokens(u64::from(max_tokens));
        }

        let response = request.send().await.map_err(|e| Error::TransientTransport {
            origin: format!("{}:{}", self.provider_name, self.model_name),
            message: e.to_string(),
        })?;

        let text = match response.choice {
            rig::completion::ModelChoice::Message(text) => text,
            rig::completion::ModelChoice::ToolCall(name, _params) => {
                return Err(Error::business(format!(
                    "unexpected tool call response from {name}"
                )));
            }
        };

        // rig-core's `CompletionResponse` does not expose a vendor-uniform
        // usage breakdown, so `return_token_info` cannot be honored here;
        // a usage-reporting provider would wrap this one and fill `usage`
        // from its own HTTP response instead.
        let _ = options.return_token_info;

        Ok(GenerationResult { text, usage: None })
    }
}
