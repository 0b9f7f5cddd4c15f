//! The Planner: turns an `Intent` into a `Plan`, either via an LLM call
//! templated with the known-tool table, or via a rule-based fallback when
//! no LLM is configured or the LLM call fails.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use qorch_core::model::{Intent, Plan, SpecialFlags, Task};
use qorch_providers::llm::{GenerationOptions, LlmProvider};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

/// Tools the Planner (and, transitively, the Gateway) knows how to route.
/// A task naming a tool outside this table still passes through post
/// -validation; it will simply fail when the Gateway can't find a service
/// for it.
pub const KNOWN_TOOLS: &[&str] = &[
    "rag_search",
    "rag_search_multiple",
    "rag_ask",
    "execute_python",
    "execute_bash",
    "web_search",
    "web_search_news",
    "git_status",
    "git_diff",
    "vision_analysis",
    "file_analysis",
];

const QUERY_EXPANSIONS: &[(&str, &[&str])] = &[
    (
        "what does it talk about",
        &[
            "main content and research topic 主要內容 研究主題",
            "methodology and technical approach 研究方法 技術方案",
            "key contributions and conclusions 主要貢獻 結論",
        ],
    ),
    (
        "what is it",
        &["definition and concept 定義 概念", "principle and mechanism 原理 機制"],
    ),
    (
        "how does it work",
        &["method and steps 方法 步驟 流程", "implementation and algorithm 實現 技術 演算法"],
    ),
    (
        "pros and cons",
        &[
            "advantages 優點 優勢",
            "limitations 缺點 限制",
            "comparison 比較",
        ],
    ),
    (
        "results",
        &["performance 性能", "results and benchmarks 結果 效果 評估"],
    ),
];

fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

fn attachment_flags(intent: &Intent) -> SpecialFlags {
    let mut flags = SpecialFlags::default();
    if let Some(items) = intent.context.metadata.get("attachments").and_then(Value::as_array) {
        flags.needs_vision = items
            .iter()
            .any(|a| a.get("type").and_then(Value::as_str) == Some("image"));
        flags.needs_file_analysis = !flags.needs_vision
            && items
                .iter()
                .any(|a| a.get("type").and_then(Value::as_str) == Some("file"));
    }
    flags
}

fn selected_docs(intent: &Intent) -> Option<Vec<String>> {
    intent
        .parameters
        .get("selected_docs")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
}

pub struct Planner {
    llm: Option<Arc<dyn LlmProvider>>,
}

impl Planner {
    #[must_use]
    pub fn new(llm: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { llm }
    }

    /// Produces a validated, topologically ordered `Plan` for `intent`.
    /// Preprocessing short-circuits (vision / file analysis) bypass both
    /// the LLM and the fallback planner.
    pub async fn create_plan(&self, intent: &Intent) -> Plan {
        let flags = attachment_flags(intent);
        if flags.needs_vision {
            let mut plan = Plan::empty("the query includes image attachments; routing to vision analysis");
            plan.special_flags = flags;
            return plan;
        }
        if flags.needs_file_analysis {
            let mut plan = Plan::empty("the query includes file attachments; routing to file analysis");
            plan.special_flags = flags;
            return plan;
        }

        let docs = selected_docs(intent);

        let plan = match &self.llm {
            Some(llm) => match self.llm_plan(llm.as_ref(), intent).await {
                Ok(plan) => plan,
                Err(err) => {
                    warn!(error = %err, "planner LLM call failed, falling back to rule-based plan");
                    self.fallback_plan(&intent.content)
                }
            },
            None => self.fallback_plan(&intent.content),
        };

        Self::validate_and_enrich(plan, docs.as_deref())
    }

    async fn llm_plan(&self, llm: &dyn LlmProvider, intent: &Intent) -> qorch_core::Result<Plan> {
        let system_prompt = format!(
            "You are a task planner. Known tools: {}. Given the user's request, respond with strict JSON: \
             {{\"analysis\": string, \"sub_questions\": [string], \"tasks\": [{{\"id\": string, \"tool\": string, \
             \"parameters\": object, \"dependencies\": [string], \"description\": string}}], \"reasoning\": string}}.",
            KNOWN_TOOLS.join(", ")
        );
        let options = GenerationOptions {
            system_prompt: Some(system_prompt),
            ..GenerationOptions::default()
        };
        let result = llm.generate(&intent.content, &options).await?;
        let output: LlmPlanOutput = serde_json::from_str(result.text.trim()).map_err(|e| {
            qorch_core::Error::business(format!("planner LLM output was not valid plan JSON: {e}"))
        })?;
        Ok(output.into_plan())
    }

    /// The rule-based fallback: colloquial-intent pattern expansion into
    /// multi-angle queries, and a keyword heuristic to choose between
    /// execution, pure search, or search-then-answer.
    fn fallback_plan(&self, content: &str) -> Plan {
        let content_lower = content.to_lowercase();

        let mut queries: Vec<String> = Vec::new();
        for (pattern, expansions) in QUERY_EXPANSIONS {
            if content_lower.contains(pattern) {
                let base_terms = content_lower.replace(pattern, "");
                let base_terms = base_terms.trim();
                for expansion in *expansions {
                    if base_terms.is_empty() {
                        queries.push((*expansion).to_string());
                    } else {
                        queries.push(format!("{base_terms} {expansion}"));
                    }
                }
                break;
            }
        }

        if queries.is_empty() {
            queries.push(content.to_string());
            let keywords: Vec<&str> = content.split_whitespace().filter(|w| w.len() > 1).collect();
            if !keywords.is_empty() {
                queries.push(keywords.join(" "));
            }
            if contains_cjk(content) {
                queries.push(content.to_string());
            }
        }

        let is_bash = ["執行", "run", "bash", "shell", "命令", "list files", "list directory", "ls -", "ls "]
            .iter()
            .any(|kw| content_lower.contains(kw));
        let is_python = ["python", "程式碼", "code"].iter().any(|kw| content_lower.contains(kw));
        let is_search = ["搜尋", "找", "查詢", "search", "find", "列出"]
            .iter()
            .any(|kw| content_lower.contains(kw));

        let mut tasks = Vec::new();
        if is_bash {
            let mut task = Task::new("task_1", "execute_bash", "run the requested command");
            task.parameters.insert("command".to_string(), json!(content));
            tasks.push(task);
        } else if is_python {
            let mut task = Task::new("task_1", "execute_python", "run the requested code");
            task.parameters.insert("code".to_string(), json!(content));
            tasks.push(task);
        } else if is_search {
            let mut task = Task::new("task_1", "rag_search_multiple", "search the knowledge base from multiple angles");
            task.parameters.insert("queries".to_string(), json!(queries.iter().take(3).collect::<Vec<_>>()));
            task.parameters.insert("top_k".to_string(), json!(5));
            tasks.push(task);
        } else {
            let search_id = "task_1";
            if queries.len() > 1 {
                let mut search_task = Task::new(search_id, "rag_search_multiple", "search related content from multiple angles");
                search_task
                    .parameters
                    .insert("queries".to_string(), json!(queries.iter().take(3).collect::<Vec<_>>()));
                search_task.parameters.insert("top_k".to_string(), json!(5));
                tasks.push(search_task);
            }
            let answer_id = if queries.len() > 1 { "task_2" } else { "task_1" };
            let mut answer_task = Task::new(answer_id, "rag_ask", "answer the question using retrieved context");
            answer_task.parameters.insert("question".to_string(), json!(content));
            answer_task.parameters.insert("top_k".to_string(), json!(8));
            if queries.len() > 1 {
                answer_task.dependencies.push(search_id.to_string());
            }
            tasks.push(answer_task);
        }

        let execution_order: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        Plan {
            analysis: format!("generated {} query angle(s) from a rule-based fallback", queries.len()),
            sub_questions: queries,
            tasks,
            execution_order,
            reasoning: "rule-based fallback plan (no LLM available)".to_string(),
            special_flags: SpecialFlags::default(),
        }
    }

    /// Assigns missing ids/descriptions, attaches services via the Router
    /// table, injects `selected_docs` as a RAG `filters` parameter, and
    /// recomputes `execution_order` by Kahn's topological sort — breaking
    /// cycles by dropping the lexicographically first remaining id, so the
    /// result is deterministic.
    fn validate_and_enrich(mut plan: Plan, selected_docs: Option<&[String]>) -> Plan {
        for (i, task) in plan.tasks.iter_mut().enumerate() {
            if task.id.is_empty() {
                task.id = format!("task_{}", i + 1);
            }
            if task.description.is_empty() {
                task.description = format!("execute {}", task.tool);
            }
            if task.service.is_none() {
                task.service = Some(crate::router::Router::resolve_service(&task.tool).to_string());
            }
            if let Some(docs) = selected_docs {
                if matches!(task.tool.as_str(), "rag_search" | "rag_ask" | "rag_search_multiple") {
                    task.parameters.insert("filters".to_string(), json!({"file_name": docs}));
                }
            }
        }

        plan.execution_order = topological_order(&plan.tasks);
        plan
    }
}

fn topological_order(tasks: &[Task]) -> Vec<String> {
    if tasks.is_empty() {
        return Vec::new();
    }

    let task_ids: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut remaining: BTreeSet<String> = tasks.iter().map(|t| t.id.clone()).collect();
    let mut result = Vec::with_capacity(tasks.len());

    while !remaining.is_empty() {
        let ready: Vec<String> = remaining
            .iter()
            .filter(|id| {
                let task = task_ids[id.as_str()];
                let deps: HashSet<&str> = task.dependencies.iter().map(String::as_str).collect();
                !deps.iter().any(|d| remaining.contains(*d))
            })
            .cloned()
            .collect();

        let ready = if ready.is_empty() {
            vec![remaining.iter().next().expect("remaining is non-empty").clone()]
        } else {
            ready
        };

        for id in ready {
            result.push(id.clone());
            remaining.remove(&id);
        }
    }

    result
}

#[derive(Debug, Deserialize)]
struct LlmTaskOutput {
    #[serde(default)]
    id: String,
    tool: String,
    #[serde(default)]
    parameters: HashMap<String, Value>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct LlmPlanOutput {
    analysis: String,
    #[serde(default)]
    sub_questions: Vec<String>,
    #[serde(default)]
    tasks: Vec<LlmTaskOutput>,
    #[serde(default)]
    reasoning: String,
}

impl LlmPlanOutput {
    fn into_plan(self) -> Plan {
        let tasks: Vec<Task> = self
            .tasks
            .into_iter()
            .map(|t| Task {
                id: t.id,
                tool: t.tool,
                service: None,
                parameters: t.parameters,
                dependencies: t.dependencies,
                description: t.description,
                timeout_secs: None,
            })
            .collect();

        Plan {
            analysis: self.analysis,
            sub_questions: self.sub_questions,
            tasks,
            execution_order: Vec::new(),
            reasoning: self.reasoning,
            special_flags: SpecialFlags::default(),
        }
    }
}
