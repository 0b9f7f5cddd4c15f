//! Wires the orchestration core's components into one runnable unit from
//! layered [`qorch_config::Settings`]: a Gateway with the CLI's own local
//! services registered, the Orchestrator, and the deep-research workflow,
//! all sharing one hybrid retriever and one LLM provider selection.

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use qorch_config::Settings;
use qorch_context::ContextStore;
use qorch_core::Result;
use qorch_events::EventBus;
use qorch_gateway::circuit_breaker::BreakerConfig;
use qorch_gateway::Gateway;
use qorch_memory::MemoryActor;
use qorch_orchestrator::executor::ExecutorPool;
use qorch_orchestrator::file_extraction::PlaceholderFileExtractor;
use qorch_orchestrator::orchestrator::Orchestrator;
use qorch_orchestrator::planner::Planner;
use qorch_providers::llm::LlmProvider;
use qorch_providers::rig_provider::RigLlmProvider;
use qorch_research::ResearchWorkflow;
use qorch_retriever::HybridRetriever;
use qorch_storage::vector::InMemoryVectorStore;

use crate::demo::{EchoLlmProvider, KnowledgeService, LocalEmbedder, LocalSandboxService, LOCAL_EMBEDDING_DIMS};

const COLLECTION: &str = "qorch-cli-demo";

pub struct Runtime {
    pub settings: Settings,
    pub orchestrator: Arc<Orchestrator>,
    pub research: Arc<ResearchWorkflow>,
}

/// Picks a real `rig-core`-backed provider from environment credentials,
/// preferring Anthropic, or falls back to [`EchoLlmProvider`] with a
/// warning. Vendor selection by env var matches the precedent set by
/// `qorch-providers`' own `RigLlmProvider::new`, which takes the vendor
/// name and key directly rather than discovering them itself.
fn select_llm_provider() -> Arc<dyn LlmProvider> {
    if let Ok(key) = env::var("ANTHROPIC_API_KEY") {
        match RigLlmProvider::new("anthropic", &key, "claude-3-5-sonnet-20241022") {
            Ok(provider) => return Arc::new(provider),
            Err(e) => tracing::warn!(error = %e, "failed to construct Anthropic provider, falling back to echo"),
        }
    }
    if let Ok(key) = env::var("OPENAI_API_KEY") {
        match RigLlmProvider::new("openai", &key, "gpt-4o-mini") {
            Ok(provider) => return Arc::new(provider),
            Err(e) => tracing::warn!(error = %e, "failed to construct OpenAI provider, falling back to echo"),
        }
    }
    tracing::warn!("no ANTHROPIC_API_KEY or OPENAI_API_KEY set, answers are placeholders");
    Arc::new(EchoLlmProvider)
}

impl Runtime {
    pub async fn build(config_path: Option<&Path>) -> Result<Self> {
        let settings = Settings::load(config_path)?;

        let breaker_config = BreakerConfig {
            failure_threshold: settings.gateway.failure_threshold,
            recovery_timeout: Duration::from_secs(settings.gateway.recovery_timeout_secs),
        };
        let gateway = Gateway::new(breaker_config, Duration::from_secs(settings.gateway.health_interval_secs));

        let vector_store = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(LocalEmbedder::new(LOCAL_EMBEDDING_DIMS));
        crate::demo::seed_demo_corpus(&vector_store, &embedder, COLLECTION).await?;

        let retriever = Arc::new(HybridRetriever::new(
            vector_store,
            embedder,
            None,
            settings.retriever.clone(),
            COLLECTION,
            "local",
            "none",
        ));

        gateway.register(Arc::new(LocalSandboxService)).await?;
        gateway
            .register(Arc::new(KnowledgeService::new(retriever.clone())))
            .await?;

        let llm = select_llm_provider();

        let context_store = Arc::new(ContextStore::new(
            settings.context.max_history,
            Duration::from_secs(settings.context.default_ttl_secs),
        ));
        let memory = Arc::new(MemoryActor::new(settings.memory.max_session_history, settings.memory.max_skills));
        let event_bus = Arc::new(EventBus::new(1000));
        let executor_pool = Arc::new(ExecutorPool::new(
            gateway,
            settings.orchestrator.executor_pool_size,
            Duration::from_secs(settings.orchestrator.executor_default_timeout_secs),
            settings.orchestrator.executor_max_retries,
        ));

        // Only hand the Planner a real LLM when one is configured; an echo
        // provider can't produce a usable JSON plan, and the rule-based
        // fallback planner (triggered by `Planner::new(None)`) is already
        // the correct behavior in that case.
        let planner_llm = if env::var("ANTHROPIC_API_KEY").is_ok() || env::var("OPENAI_API_KEY").is_ok() {
            Some(llm.clone())
        } else {
            None
        };

        let orchestrator = Arc::new(Orchestrator::new(
            context_store,
            memory,
            event_bus,
            Arc::new(Planner::new(planner_llm)),
            executor_pool,
            llm.clone(),
            None,
            Arc::new(PlaceholderFileExtractor),
            settings.orchestrator.clone(),
        ));

        let research = ResearchWorkflow::new(retriever, Some(llm), settings.research.clone());

        Ok(Self {
            settings,
            orchestrator,
            research,
        })
    }
}
