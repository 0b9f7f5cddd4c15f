//! The Deep-Research Workflow: a multi-round state machine independent of
//! the generic Orchestrator plan/execute loop. `start_research` spawns the
//! run and returns immediately; callers poll `get_task` or (via a facade)
//! subscribe to the task's progress.
//!
//! Mirrors `qorch_context::ContextStore`'s cache-plus-optional-durable-
//! backend shape: an in-process `DashMap` is the authoritative read-through
//! cache, an optional `KvBackend` persists a serialized snapshot after
//! every state transition, and a backend failure degrades to local-only
//! with a single warning rather than failing the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use qorch_config::ResearchSettings;
use qorch_core::model::{
    Finding, ResearchStatus, ResearchStep, ResearchTask, SourceRef, StepStatus,
};
use qorch_providers::llm::{GenerationOptions, LlmProvider};
use qorch_retriever::retriever::HybridRetriever;
use qorch_storage::vector::Filter;
use qorch_storage::KvBackend;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

const SUB_QUESTION_SYSTEM_PROMPT: &str = "You decompose a research topic into focused sub-questions. \
Respond with strict JSON: {\"sub_questions\": [string, ...]}.";

const REVIEW_SYSTEM_PROMPT: &str = "You review research findings for completeness against the original topic. \
Respond with strict JSON: {\"sufficient\": bool, \"additional_queries\": [{\"query\": string, \"research_goal\": string}]}.";

const REPORT_SYSTEM_PROMPT: &str = "You write a final research report from a topic, a set of learnings, and a \
numbered source list. Structure: a short plan recap, the learnings synthesized into prose, a sources section, \
and (if any image sources were supplied) an images section. Cite sources inline as [1], [2], etc. matching the \
numbered source list. Never fabricate a claim the learnings don't support.";

fn backend_key(id: Uuid) -> String {
    format!("research_task:{id}")
}

/// A lightweight projection of a `ResearchTask` for `list_tasks`, avoiding
/// the cost of serializing every step/finding/source for a listing view.
#[derive(Debug, Clone)]
pub struct ResearchTaskSummary {
    pub id: Uuid,
    pub topic: String,
    pub status: ResearchStatus,
    pub progress: u8,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<&ResearchTask> for ResearchTaskSummary {
    fn from(task: &ResearchTask) -> Self {
        Self {
            id: task.id,
            topic: task.topic.clone(),
            status: task.status,
            progress: task.progress,
            created_at: task.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubQuestionOutput {
    #[serde(default)]
    sub_questions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AdditionalQuery {
    query: String,
    #[serde(default)]
    research_goal: String,
}

#[derive(Debug, Deserialize)]
struct ReviewOutput {
    #[serde(default)]
    sufficient: bool,
    #[serde(default)]
    additional_queries: Vec<AdditionalQuery>,
}

pub struct ResearchWorkflow {
    retriever: Arc<HybridRetriever>,
    llm: Option<Arc<dyn LlmProvider>>,
    settings: ResearchSettings,
    tasks: DashMap<Uuid, ResearchTask>,
    backend: Option<Arc<dyn KvBackend>>,
    backend_degraded: AtomicBool,
}

impl ResearchWorkflow {
    #[must_use]
    pub fn new(
        retriever: Arc<HybridRetriever>,
        llm: Option<Arc<dyn LlmProvider>>,
        settings: ResearchSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            retriever,
            llm,
            settings,
            tasks: DashMap::new(),
            backend: None,
            backend_degraded: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn with_backend(
        retriever: Arc<HybridRetriever>,
        llm: Option<Arc<dyn LlmProvider>>,
        settings: ResearchSettings,
        backend: Arc<dyn KvBackend>,
    ) -> Arc<Self> {
        Arc::new(Self {
            retriever,
            llm,
            settings,
            tasks: DashMap::new(),
            backend: Some(backend),
            backend_degraded: AtomicBool::new(false),
        })
    }

    async fn persist(&self, task: &ResearchTask) {
        let Some(backend) = &self.backend else {
            return;
        };
        let bytes = match serde_json::to_vec(task) {
            Ok(b) => b,
            Err(e) => {
                self.note_degraded(&format!("failed to serialize research task: {e}"));
                return;
            }
        };
        match backend.set(&backend_key(task.id), bytes, None).await {
            Ok(()) => self.backend_degraded.store(false, Ordering::SeqCst),
            Err(e) => self.note_degraded(&format!("durable research-task write failed: {e}")),
        }
    }

    fn note_degraded(&self, message: &str) {
        if !self.backend_degraded.swap(true, Ordering::SeqCst) {
            warn!(%message, "research workflow durable backend unavailable, degrading to local-only");
        }
    }

    fn update<F: FnOnce(&mut ResearchTask)>(&self, id: Uuid, f: F) -> Option<ResearchTask> {
        let mut entry = self.tasks.get_mut(&id)?;
        f(&mut entry);
        Some(entry.clone())
    }

    /// Creates a `Pending` `ResearchTask`, spawns the state-machine driver,
    /// and returns the new task's id immediately — execution is
    /// asynchronous, matching the specification's "callers poll or
    /// subscribe" contract.
    pub fn start_research(self: &Arc<Self>, topic: impl Into<String>, documents: Option<Vec<String>>) -> Uuid {
        let task = ResearchTask::new(topic, documents);
        let id = task.id;
        self.tasks.insert(id, task);

        let workflow = Arc::clone(self);
        tokio::spawn(async move {
            workflow.run(id).await;
        });

        id
    }

    #[must_use]
    pub fn get_task(&self, id: Uuid) -> Option<ResearchTask> {
        self.tasks.get(&id).map(|t| t.clone())
    }

    #[must_use]
    pub fn list_tasks(&self) -> Vec<ResearchTaskSummary> {
        let mut summaries: Vec<ResearchTaskSummary> = self.tasks.iter().map(|kv| kv.value().into()).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    fn document_filter(documents: Option<&[String]>) -> Option<Filter> {
        let docs = documents?;
        if docs.is_empty() {
            return None;
        }
        Some(Filter::new().with("file_name", docs.iter().map(|d| json!(d)).collect()))
    }

    async fn run(self: Arc<Self>, id: Uuid) {
        if let Err(err) = self.run_inner(id).await {
            warn!(task_id = %id, error = %err, "deep-research workflow failed");
            if let Some(task) = self.update(id, |task| {
                if let Some(last) = task.steps.last_mut() {
                    last.status = StepStatus::Error;
                    last.error = Some(err.clone());
                    last.completed_at = Some(Utc::now());
                }
                task.status = ResearchStatus::Failed;
                task.error = Some(err.clone());
                task.completed_at = Some(Utc::now());
            }) {
                self.persist(&task).await;
            }
        }
    }

    /// Appends a `Running` step. Not persisted on its own: the next
    /// `complete_step` or the terminal failure/success write covers it,
    /// so a crash mid-step just loses an in-progress marker, never data.
    fn begin_step(&self, id: Uuid, step: &str) {
        self.update(id, |task| {
            task.steps.push(ResearchStep {
                step: step.to_string(),
                status: StepStatus::Running,
                result: None,
                error: None,
                started_at: Utc::now(),
                completed_at: None,
            });
        });
    }

    async fn complete_step(&self, id: Uuid, progress: u8, result: impl Into<String>) {
        if let Some(task) = self.update(id, |task| {
            if let Some(last) = task.steps.last_mut() {
                last.status = StepStatus::Completed;
                last.result = Some(result.into());
                last.completed_at = Some(Utc::now());
            }
            task.advance_progress(progress);
        }) {
            self.persist(&task).await;
        }
    }

    async fn run_inner(&self, id: Uuid) -> Result<(), String> {
        let Some(task) = self.get_task(id) else {
            return Err("research task not found".to_string());
        };
        let topic = task.topic.clone();
        let documents = task.documents_filter.clone();

        self.update(id, |task| task.status = ResearchStatus::Running);

        // 2. Sub-question generation (5%-15%).
        self.begin_step(id, "generate_sub_questions");
        let sub_questions = self.generate_sub_questions(&topic).await;
        self.complete_step(id, 15, format!("{} sub-question(s) generated", sub_questions.len()))
            .await;

        // 3. Per-question retrieval + answering (15%-75%).
        let filter = Self::document_filter(documents.as_deref());
        let question_count = sub_questions.len().max(1);
        let progress_span = 75u8.saturating_sub(15);
        for (i, question) in sub_questions.iter().enumerate() {
            let step_progress = 15 + ((i + 1) as u32 * u32::from(progress_span) / question_count as u32) as u8;
            self.answer_and_record(id, question, filter.as_ref(), step_progress).await?;
        }

        // 4. Progress review (75%), capped at one review with <= N extra
        // queries.
        self.begin_step(id, "progress_review");
        let extra_queries = self.review_findings(id, &topic).await;
        self.complete_step(id, 75, format!("{} additional quer(ies) identified", extra_queries.len()))
            .await;

        for query in extra_queries.into_iter().take(self.settings.max_review_extra_queries) {
            self.answer_and_record(id, &query, filter.as_ref(), 80).await?;
        }

        // 5. Final report (85%-100%).
        self.begin_step(id, "compose_report");
        let report = self.compose_report(id, &topic).await;
        self.complete_step(id, 100, "report composed").await;

        if let Some(task) = self.update(id, |task| {
            task.report = Some(report);
            task.status = ResearchStatus::Completed;
            task.completed_at = Some(Utc::now());
        }) {
            self.persist(&task).await;
        }
        info!(task_id = %id, "deep-research workflow completed");
        Ok(())
    }

    async fn generate_sub_questions(&self, topic: &str) -> Vec<String> {
        let Some(llm) = &self.llm else {
            return vec![topic.to_string()];
        };
        let options = GenerationOptions {
            system_prompt: Some(SUB_QUESTION_SYSTEM_PROMPT.to_string()),
            ..GenerationOptions::default()
        };
        match llm.generate(topic, &options).await {
            Ok(result) => match serde_json::from_str::<SubQuestionOutput>(result.text.trim()) {
                Ok(output) if !output.sub_questions.is_empty() => {
                    let mut qs = output.sub_questions;
                    qs.truncate(self.settings.max_sub_questions);
                    qs
                }
                _ => vec![topic.to_string()],
            },
            Err(err) => {
                warn!(error = %err, "sub-question generation failed, falling back to the bare topic");
                vec![topic.to_string()]
            }
        }
    }

    /// Runs one sub-question through retrieval and (if results came back)
    /// LLM synthesis, appending a `Finding` and merging newly seen sources
    /// (deduplicated by `(file_name, page_label)`) into the task.
    async fn answer_and_record(
        &self,
        id: Uuid,
        question: &str,
        filter: Option<&Filter>,
        progress: u8,
    ) -> Result<(), String> {
        self.begin_step(id, &format!("research: {question}"));
        let chunks = self.retriever.search(question, 5, filter, false).await;

        let (answer, sources_count) = if chunks.is_empty() {
            ("No information was found for this question.".to_string(), 0)
        } else {
            let context_block: String = chunks
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let page = c.metadata.page_label.clone().unwrap_or_else(|| "?".to_string());
                    format!("[{}] {} (page {page}):\n{}", i + 1, c.metadata.file_name, c.text)
                })
                .collect::<Vec<_>>()
                .join("\n\n");

            let answer = match &self.llm {
                Some(llm) => {
                    let prompt = format!("Context:\n{context_block}\n\nQuestion: {question}");
                    llm.generate(&prompt, &GenerationOptions::default())
                        .await
                        .map_err(|e| format!("sub-question synthesis failed: {e}"))?
                        .text
                }
                None => context_block,
            };
            (answer, chunks.len())
        };

        let new_sources: Vec<SourceRef> = chunks.iter().map(|c| c.source_ref()).collect();
        self.update(id, |task| {
            task.findings.push(Finding {
                question: question.to_string(),
                answer,
                sources_count,
            });
            let mut seen: std::collections::HashSet<(String, Option<String>)> = task
                .sources
                .iter()
                .map(|s| (s.file_name.clone(), s.page_label.clone()))
                .collect();
            for source in new_sources {
                if seen.insert((source.file_name.clone(), source.page_label.clone())) {
                    task.sources.push(source);
                }
            }
        });
        self.complete_step(id, progress, "recorded finding").await;
        Ok(())
    }

    /// Asks the LLM whether the findings collected so far cover the topic;
    /// returns at most `max_review_extra_queries` additional query strings
    /// if not. Absent an LLM, or on any failure, treats coverage as
    /// sufficient (no extra rounds) rather than failing the whole run —
    /// the review step is advisory, unlike sub-question generation or
    /// per-question synthesis.
    async fn review_findings(&self, id: Uuid, topic: &str) -> Vec<String> {
        let Some(llm) = &self.llm else {
            return Vec::new();
        };
        if self.settings.max_reviews == 0 {
            return Vec::new();
        }
        let Some(task) = self.get_task(id) else {
            return Vec::new();
        };

        let findings_block: String = task
            .findings
            .iter()
            .map(|f| format!("Q: {}\nA: {}", f.question, f.answer))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = format!("Topic: {topic}\n\nFindings so far:\n{findings_block}");
        let options = GenerationOptions {
            system_prompt: Some(REVIEW_SYSTEM_PROMPT.to_string()),
            ..GenerationOptions::default()
        };

        match llm.generate(&prompt, &options).await {
            Ok(result) => match serde_json::from_str::<ReviewOutput>(result.text.trim()) {
                Ok(output) if !output.sufficient => output
                    .additional_queries
                    .into_iter()
                    .take(self.settings.max_review_extra_queries)
                    .map(|q| q.query)
                    .collect(),
                _ => Vec::new(),
            },
            Err(err) => {
                warn!(error = %err, "progress review LLM call failed, skipping adaptive round");
                Vec::new()
            }
        }
    }

    /// Composes the final report via the plan/learnings/sources template;
    /// on LLM absence or failure, falls back to concatenating
    /// `## question\n\nanswer` sections under a `# topic` heading.
    async fn compose_report(&self, id: Uuid, topic: &str) -> String {
        let Some(task) = self.get_task(id) else {
            return format!("# {topic}\n\nNo findings were recorded.");
        };

        let fallback = || {
            let mut report = format!("# {topic}\n\n");
            for finding in &task.findings {
                report.push_str(&format!("## {}\n\n{}\n\n", finding.question, finding.answer));
            }
            report
        };

        let Some(llm) = &self.llm else {
            return fallback();
        };

        let sources_block: String = task
            .sources
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let page = s.page_label.clone().unwrap_or_else(|| "?".to_string());
                format!("[{}] {} (page {page})", i + 1, s.file_name)
            })
            .collect::<Vec<_>>()
            .join("\n");
        let learnings_block: String = task
            .findings
            .iter()
            .map(|f| format!("- {}: {}", f.question, f.answer))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Topic: {topic}\n\nLearnings:\n{learnings_block}\n\nNumbered sources:\n{sources_block}"
        );
        let options = GenerationOptions {
            system_prompt: Some(REPORT_SYSTEM_PROMPT.to_string()),
            ..GenerationOptions::default()
        };

        match llm.generate(&prompt, &options).await {
            Ok(result) => result.text,
            Err(err) => {
                warn!(error = %err, "final report synthesis failed, falling back to a concatenated summary");
                fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use qorch_providers::embedder::{Embedder, InputType};
    use qorch_providers::llm::GenerationResult;
    use qorch_storage::vector::{CollectionConfig, Distance, InMemoryVectorStore, Point};
    use std::time::Duration;

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn name(&self) -> &str {
            "stub"
        }

        async fn embed(&self, texts: &[String], _model: &str, _input_type: InputType) -> qorch_core::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct StubLlm;

    #[async_trait]
    impl LlmProvider for StubLlm {
        fn name(&self) -> &str {
            "stub"
        }

        async fn generate(&self, prompt: &str, options: &GenerationOptions) -> qorch_core::Result<GenerationResult> {
            if options.system_prompt.as_deref() == Some(SUB_QUESTION_SYSTEM_PROMPT) {
                return Ok(GenerationResult {
                    text: json!({"sub_questions": ["what is it", "how does it work"]}).to_string(),
                    usage: None,
                });
            }
            if options.system_prompt.as_deref() == Some(REVIEW_SYSTEM_PROMPT) {
                return Ok(GenerationResult {
                    text: json!({"sufficient": true, "additional_queries": []}).to_string(),
                    usage: None,
                });
            }
            if options.system_prompt.as_deref() == Some(REPORT_SYSTEM_PROMPT) {
                return Ok(GenerationResult {
                    text: format!("# report\n\n{prompt}\n\n[1]"),
                    usage: None,
                });
            }
            Ok(GenerationResult {
                text: format!("synthesized answer for: {prompt}"),
                usage: None,
            })
        }
    }

    fn make_retriever() -> Arc<HybridRetriever> {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .create_collection("docs", CollectionConfig { vector_size: 2, distance: Distance::Cosine })
            .unwrap();
        store
            .upsert(
                "docs",
                vec![Point {
                    id: "1".to_string(),
                    vector: vec![1.0, 0.0],
                    payload: json!({"text": "CLIP pairs images and text in a shared embedding space", "file_name": "clip.pdf", "page_label": "3"}),
                }],
            )
            .unwrap();
        Arc::new(HybridRetriever::new(
            store,
            Arc::new(StubEmbedder),
            None,
            qorch_config::RetrieverSettings::default(),
            "docs",
            "embed-model",
            "rerank-model",
        ))
    }

    #[tokio::test]
    async fn research_run_completes_with_report_and_sources() {
        let workflow = ResearchWorkflow::new(make_retriever(), Some(Arc::new(StubLlm)), ResearchSettings::default());
        let id = workflow.start_research("CLIP training", None);

        let mut task = None;
        for _ in 0..100 {
            if let Some(t) = workflow.get_task(id) {
                if matches!(t.status, ResearchStatus::Completed | ResearchStatus::Failed) {
                    task = Some(t);
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let task = task.expect("research task completes within the polling window");
        assert_eq!(task.status, ResearchStatus::Completed);
        assert_eq!(task.progress, 100);
        assert!(!task.findings.is_empty());
        assert!(!task.sources.is_empty());
        assert!(task.report.is_some());
    }

    #[tokio::test]
    async fn list_tasks_reflects_in_flight_and_completed_runs() {
        let workflow = ResearchWorkflow::new(make_retriever(), None, ResearchSettings::default());
        let id = workflow.start_research("a topic with no llm", None);

        for _ in 0..100 {
            if workflow.get_task(id).map(|t| t.status) == Some(ResearchStatus::Completed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let summaries = workflow.list_tasks();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, id);
    }

    #[tokio::test]
    async fn progress_is_monotonic_across_the_whole_run() {
        let workflow = ResearchWorkflow::new(make_retriever(), Some(Arc::new(StubLlm)), ResearchSettings::default());
        let id = workflow.start_research("progress check", None);

        let mut last = 0u8;
        for _ in 0..200 {
            if let Some(t) = workflow.get_task(id) {
                assert!(t.progress >= last, "progress must never move backwards");
                last = t.progress;
                if matches!(t.status, ResearchStatus::Completed | ResearchStatus::Failed) {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
