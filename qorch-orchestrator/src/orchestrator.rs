//! The Orchestrator: the per-request supervisor. Owns the Context Store,
//! Memory, Gateway-backed Executor pool, Router, and Planner, and drives
//! the `idle -> planning -> executing -> synthesizing -> done` state
//! machine described in the specification, streaming `Event`s as they
//! land.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use qorch_config::OrchestratorSettings;
use qorch_context::ContextStore;
use qorch_core::model::{
    Context, Event, EventData, EventPayload, EventType, Intent, Request, SourceRef, Task,
    TaskSummary,
};
use qorch_core::{Error, Result};
use qorch_events::EventBus;
use qorch_memory::MemoryActor;
use qorch_providers::llm::{GenerationOptions, LlmProvider};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;
use uuid::Uuid;

use crate::executor::{ExecutorPool, TaskOutcome};
use crate::file_extraction::{extract_text, FileExtractor};
use crate::planner::Planner;
use crate::router::Router;
use crate::supervisor::Supervisor;

const ANSWER_SYSTEM_PROMPT: &str = "Answer the user's question using only the context provided below, \
writing the answer in Traditional Chinese (繁體中文). \
If the context doesn't contain the answer, say so plainly rather than fabricating one. \
Cite sources inline as [1], [2], etc. matching their order in the context.";

pub struct Orchestrator {
    context_store: Arc<ContextStore>,
    memory: Arc<MemoryActor>,
    event_bus: Arc<EventBus>,
    planner: Arc<Planner>,
    executor_pool: Arc<ExecutorPool>,
    answer_llm: Arc<dyn LlmProvider>,
    vision_llm: Option<Arc<dyn LlmProvider>>,
    file_extractor: Arc<dyn FileExtractor>,
    supervisor: Supervisor,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context_store: Arc<ContextStore>,
        memory: Arc<MemoryActor>,
        event_bus: Arc<EventBus>,
        planner: Arc<Planner>,
        executor_pool: Arc<ExecutorPool>,
        answer_llm: Arc<dyn LlmProvider>,
        vision_llm: Option<Arc<dyn LlmProvider>>,
        file_extractor: Arc<dyn FileExtractor>,
        settings: OrchestratorSettings,
    ) -> Self {
        let supervisor = Supervisor::new(settings.child_restart_budget);
        Self {
            context_store,
            memory,
            event_bus,
            planner,
            executor_pool,
            answer_llm,
            vision_llm,
            file_extractor,
            supervisor,
            settings,
        }
    }

    async fn emit(&self, tx: &mpsc::Sender<Event>, event: Event) {
        self.event_bus.publish(event.clone()).await;
        let _ = tx.send(event).await;
    }

    /// A lazy stream of `Event`s for `request`, terminating on `Done` or
    /// `Error`, or after `stream_timeout_secs` with a synthesized timeout
    /// error if the request hasn't finished by then.
    #[must_use]
    pub fn process_intent(self: Arc<Self>, request: Request) -> ReceiverStream<Event> {
        let (tx, rx) = mpsc::channel(self.settings.mailbox_capacity.clamp(16, 1024));
        let stream_timeout = Duration::from_secs(self.settings.stream_timeout_secs);
        let correlation_id = request.id;

        tokio::spawn(async move {
            let tx_for_run = tx.clone();
            let outcome = tokio::time::timeout(stream_timeout, self.run_request(request, tx_for_run)).await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    self.emit(
                        &tx,
                        Event::new(EventType::Error, "orchestrator", correlation_id, EventPayload::text(err.to_string())),
                    )
                    .await;
                    self.emit(
                        &tx,
                        Event::new(EventType::Done, "orchestrator", correlation_id, EventPayload::text("done")),
                    )
                    .await;
                }
                Err(_) => {
                    self.emit(
                        &tx,
                        Event::new(EventType::Error, "orchestrator", correlation_id, EventPayload::text("Processing timeout")),
                    )
                    .await;
                    self.emit(
                        &tx,
                        Event::new(EventType::Done, "orchestrator", correlation_id, EventPayload::text("done")),
                    )
                    .await;
                }
            }
        });

        ReceiverStream::new(rx)
    }

    async fn run_request(&self, request: Request, tx: mpsc::Sender<Event>) -> Result<()> {
        let correlation_id = request.id;
        let mut context = self.context_store.get_or_create(&request.session_id, "unknown").await?;
        self.supervisor
            .supervise("memory", async {
                self.memory.store_session(
                    &request.session_id,
                    qorch_core::model::ConversationMessage::new("user", request.query.clone()),
                );
                Ok(())
            })
            .await?;
        context.push_message(qorch_core::model::ConversationMessage::new("user", request.query.clone()));
        self.context_store.save(context.clone()).await?;

        self.emit(
            &tx,
            Event::new(EventType::Thinking, "orchestrator", correlation_id, EventPayload::text("analyzing and planning...")),
        )
        .await;

        let intent = self.build_intent(&request, &context);
        let plan = self
            .supervisor
            .supervise("planner", async { Ok(self.planner.create_plan(&intent).await) })
            .await?;

        if plan.special_flags.needs_vision {
            return self.run_vision(&tx, correlation_id, &request).await;
        }
        if plan.special_flags.needs_file_analysis {
            return self.run_file_analysis(&tx, correlation_id, &request).await;
        }
        if plan.tasks.is_empty() {
            self.emit(
                &tx,
                Event::new(EventType::Answer, "orchestrator", correlation_id, EventPayload::with_data(plan.analysis.clone(), EventData::Answer { usage: None })),
            )
            .await;
            self.emit(&tx, Event::new(EventType::Done, "orchestrator", correlation_id, EventPayload::text("done"))).await;
            return Ok(());
        }

        self.emit(
            &tx,
            Event::new(EventType::Thinking, "orchestrator", correlation_id, EventPayload::text(plan.analysis.clone())),
        )
        .await;

        let queries = collect_queries(&plan.tasks, &plan.sub_questions);
        let task_summaries: Vec<TaskSummary> = plan
            .execution_order
            .iter()
            .filter_map(|id| plan.task(id))
            .map(|t| TaskSummary {
                id: t.id.clone(),
                tool: t.tool.clone(),
                description: t.description.clone(),
            })
            .collect();
        self.emit(
            &tx,
            Event::new(
                EventType::Plan,
                "orchestrator",
                correlation_id,
                EventPayload::with_data(
                    "execution plan ready",
                    EventData::Planning {
                        summary: plan.analysis.clone(),
                        queries,
                        tasks: task_summaries,
                    },
                ),
            ),
        )
        .await;

        let mut task_results: HashMap<String, TaskOutcome> = HashMap::new();
        for task_id in &plan.execution_order {
            let Some(task) = plan.task(task_id) else { continue };
            self.run_task(&tx, correlation_id, task, &mut task_results).await;
        }

        self.synthesize(&tx, correlation_id, &request, &context, &task_results).await?;
        Ok(())
    }

    fn build_intent(&self, request: &Request, context: &Context) -> Intent {
        let mut context = context.clone();
        if !request.attachments.is_empty() {
            context.metadata.insert("attachments".to_string(), json!(request.attachments));
        }
        let mut parameters = HashMap::new();
        if let Some(docs) = request.selected_docs() {
            parameters.insert("selected_docs".to_string(), json!(docs));
        }
        Intent {
            kind: "intent".to_string(),
            content: request.query.clone(),
            parameters,
            context,
            trace_id: request.trace_id,
        }
    }

    async fn run_task(
        &self,
        tx: &mpsc::Sender<Event>,
        correlation_id: Uuid,
        task: &Task,
        task_results: &mut HashMap<String, TaskOutcome>,
    ) {
        self.emit(
            tx,
            Event::new(
                EventType::ToolCall,
                "orchestrator",
                correlation_id,
                EventPayload::with_data(
                    task.tool.clone(),
                    EventData::ToolCall {
                        arguments: json!(task.parameters),
                        queries: task_queries(task),
                        description: task.description.clone(),
                    },
                ),
            ),
        )
        .await;

        let outcome = self.dispatch_task(task).await;

        let (preview, results_count) = summarize_outcome(&outcome);
        self.emit(
            tx,
            Event::new(
                EventType::ToolResult,
                "orchestrator",
                correlation_id,
                EventPayload::with_data(
                    format!("found {results_count} results"),
                    EventData::ToolResult { preview, results_count },
                ),
            ),
        )
        .await;

        task_results.insert(task.id.clone(), outcome);
    }

    /// Routes and runs one task under supervision of the Router and
    /// Executor-pool children: the Router resolves (or confirms) the
    /// task's service id, and the Executor pool then drives the Gateway
    /// call. Either child crashing is caught, counted against its own
    /// restart budget, and converted into a failed `TaskOutcome` rather
    /// than aborting the whole request — a single task's crash is
    /// isolated to that task, matching the supervisor's restart-then-
    /// escalate policy without taking down sibling tasks already in
    /// flight.
    async fn dispatch_task(&self, task: &Task) -> TaskOutcome {
        let routed = self
            .supervisor
            .supervise("router", async {
                Ok(task
                    .service
                    .clone()
                    .unwrap_or_else(|| Router::resolve_service(&task.tool).to_string()))
            })
            .await;

        let service_id = match routed {
            Ok(service_id) => service_id,
            Err(err) => return TaskOutcome::failed(err.to_string()),
        };

        let mut routed_task = task.clone();
        routed_task.service = Some(service_id);

        self.supervisor
            .supervise("executor_pool", async {
                Ok(self.executor_pool.execute_task(&routed_task).await)
            })
            .await
            .unwrap_or_else(|err| TaskOutcome::failed(err.to_string()))
    }

    async fn synthesize(
        &self,
        tx: &mpsc::Sender<Event>,
        correlation_id: Uuid,
        request: &Request,
        context: &Context,
        task_results: &HashMap<String, TaskOutcome>,
    ) -> Result<()> {
        let mut context_texts = Vec::new();
        let mut sources: Vec<SourceRef> = Vec::new();
        let mut seen_sources = HashSet::new();

        for outcome in task_results.values() {
            let Some(value) = &outcome.result else { continue };
            let Ok(retrieval) = serde_json::from_value::<qorch_core::model::Retrieval>(value.clone()) else {
                continue;
            };
            for chunk in &retrieval.results {
                if chunk.text.len() > 20 {
                    context_texts.push(chunk.text.clone());
                }
                let source_ref = chunk.source_ref();
                if seen_sources.insert((source_ref.file_name.clone(), source_ref.page_label.clone())) {
                    sources.push(source_ref);
                }
            }
        }

        self.emit(
            tx,
            Event::new(
                EventType::Thinking,
                "orchestrator",
                correlation_id,
                EventPayload::with_data(
                    "synthesizing answer from retrieved context",
                    EventData::Generating {
                        context_chunks: context_texts.len(),
                        sources: sources.len(),
                    },
                ),
            ),
        )
        .await;

        let context_block = context_texts.join("\n\n---\n\n");
        let prompt = format!("Context:\n{context_block}\n\nQuestion: {}", request.query);
        let options = GenerationOptions {
            system_prompt: Some(ANSWER_SYSTEM_PROMPT.to_string()),
            ..GenerationOptions::default()
        };

        let generation = self.answer_llm.generate(&prompt, &options).await?;

        self.emit(
            tx,
            Event::new(
                EventType::Answer,
                "orchestrator",
                correlation_id,
                EventPayload::with_data(generation.text.clone(), EventData::Answer { usage: generation.usage.map(Into::into) }),
            ),
        )
        .await;

        if !sources.is_empty() {
            let shown: Vec<SourceRef> = sources.iter().take(5).cloned().collect();
            self.emit(
                tx,
                Event::new(
                    EventType::Source,
                    "orchestrator",
                    correlation_id,
                    EventPayload::with_data(format!("{} source(s)", sources.len()), EventData::Source { sources: shown }),
                ),
            )
            .await;
        }

        self.emit(tx, Event::new(EventType::Done, "orchestrator", correlation_id, EventPayload::text("done"))).await;

        let mut context = context.clone();
        context.push_message(qorch_core::model::ConversationMessage::new("assistant", generation.text));
        self.context_store.save(context).await?;
        Ok(())
    }

    async fn run_vision(&self, tx: &mpsc::Sender<Event>, correlation_id: Uuid, request: &Request) -> Result<()> {
        self.emit(
            tx,
            Event::new(EventType::Thinking, "orchestrator", correlation_id, EventPayload::with_data("analyzing image", EventData::Vision)),
        )
        .await;

        let llm = self
            .vision_llm
            .clone()
            .ok_or_else(|| Error::configuration("no vision-capable LLM configured"))?;

        let prompt = format!(
            "{}\n\n({} image attachment(s) supplied via the provider's multimodal channel)",
            request.query,
            request.attachments.len()
        );
        let generation = llm.generate(&prompt, &GenerationOptions::default()).await?;

        if let Some(usage) = &generation.usage {
            let cost_usd = (f64::from(usage.prompt_tokens) * 0.005 + f64::from(usage.completion_tokens) * 0.015) / 1000.0;
            info!(cost_usd, "estimated vision call cost");
        }

        self.emit(
            tx,
            Event::new(
                EventType::Answer,
                "orchestrator",
                correlation_id,
                EventPayload::with_data(generation.text, EventData::Answer { usage: generation.usage.map(Into::into) }),
            ),
        )
        .await;
        self.emit(tx, Event::new(EventType::Done, "orchestrator", correlation_id, EventPayload::text("done"))).await;
        Ok(())
    }

    async fn run_file_analysis(&self, tx: &mpsc::Sender<Event>, correlation_id: Uuid, request: &Request) -> Result<()> {
        self.emit(
            tx,
            Event::new(EventType::Thinking, "orchestrator", correlation_id, EventPayload::with_data("analyzing file", EventData::FileAnalysis)),
        )
        .await;

        let mut extracted = Vec::new();
        for attachment in &request.attachments {
            if attachment.kind == qorch_core::model::AttachmentKind::File {
                extracted.push(extract_text(attachment, self.file_extractor.as_ref()).await);
            }
        }

        let prompt = format!(
            "Document content:\n{}\n\nQuestion: {}",
            extracted.join("\n\n---\n\n"),
            request.query
        );
        let generation = self.answer_llm.generate(&prompt, &GenerationOptions::default()).await?;

        self.emit(
            tx,
            Event::new(
                EventType::Answer,
                "orchestrator",
                correlation_id,
                EventPayload::with_data(generation.text, EventData::Answer { usage: generation.usage.map(Into::into) }),
            ),
        )
        .await;
        self.emit(tx, Event::new(EventType::Done, "orchestrator", correlation_id, EventPayload::text("done"))).await;
        Ok(())
    }
}

fn task_queries(task: &Task) -> Vec<String> {
    if let Some(queries) = task.parameters.get("queries").and_then(|v| v.as_array()) {
        return queries.iter().filter_map(|v| v.as_str().map(String::from)).collect();
    }
    if let Some(question) = task.parameters.get("question").and_then(|v| v.as_str()) {
        return vec![question.to_string()];
    }
    Vec::new()
}

fn collect_queries(tasks: &[Task], sub_questions: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for q in sub_questions.iter().cloned().chain(tasks.iter().flat_map(task_queries)) {
        if seen.insert(q.clone()) {
            out.push(q);
        }
    }
    out
}

fn summarize_outcome(outcome: &TaskOutcome) -> (String, usize) {
    let Some(value) = &outcome.result else {
        return (outcome.error.clone().unwrap_or_default(), 0);
    };
    if let Ok(retrieval) = serde_json::from_value::<qorch_core::model::Retrieval>(value.clone()) {
        let preview: String = retrieval
            .results
            .first()
            .map(|c| c.text.chars().take(200).collect())
            .unwrap_or_default();
        return (preview, retrieval.results.len());
    }
    let preview: String = value.to_string().chars().take(200).collect();
    (preview, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_extraction::PlaceholderFileExtractor;
    use futures::StreamExt;
    use qorch_gateway::circuit_breaker::BreakerConfig;
    use qorch_gateway::Gateway;
    use qorch_providers::llm::GenerationResult;
    use std::time::Duration as StdDuration;

    struct StubLlm(&'static str);

    #[async_trait::async_trait]
    impl LlmProvider for StubLlm {
        fn name(&self) -> &str {
            "stub"
        }

        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<GenerationResult> {
            Ok(GenerationResult {
                text: self.0.to_string(),
                usage: None,
            })
        }
    }

    fn build_orchestrator() -> Arc<Orchestrator> {
        let gateway = Gateway::new(BreakerConfig::default(), StdDuration::from_secs(60));
        let pool = Arc::new(ExecutorPool::new(gateway, 1, StdDuration::from_secs(5), 1));
        Arc::new(Orchestrator::new(
            Arc::new(ContextStore::new(50, StdDuration::from_secs(3600))),
            Arc::new(MemoryActor::new(50, 200)),
            Arc::new(EventBus::new(100)),
            Arc::new(Planner::new(None)),
            pool,
            Arc::new(StubLlm("the synthesized answer")),
            None,
            Arc::new(PlaceholderFileExtractor),
            OrchestratorSettings::default(),
        ))
    }

    #[tokio::test]
    async fn plain_chat_request_with_no_tasks_answers_directly() {
        let orchestrator = build_orchestrator();
        let request = Request::new("hi there", "s1");
        let mut stream = orchestrator.process_intent(request);

        let mut kinds = Vec::new();
        while let Some(event) = stream.next().await {
            kinds.push(event.kind);
            if event.is_terminal() {
                break;
            }
        }
        assert!(kinds.contains(&EventType::Done));
    }
}
