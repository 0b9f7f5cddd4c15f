//! The data model shared by every component of the orchestration core.
//!
//! Types here are plain data — no behavior beyond constructors and the odd
//! invariant-preserving mutator (`Context::push_message`, `Plan::task`).
//! Owning components (Orchestrator, Gateway, Memory, Deep-Research Workflow)
//! live in their respective crates and operate on `Arc`/message-passed copies
//! of these types.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Milliseconds since the Unix epoch, used for `Event::timestamp`.
pub type EpochMillis = i64;

#[must_use]
pub fn now_millis() -> EpochMillis {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// The explicit processing mode a caller may request, or `Auto` to let the
/// Planner/Orchestrator decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Chat,
    Thinking,
    Knowledge,
    Search,
    Code,
    DeepResearch,
    Auto,
}

impl Default for Mode {
    fn default() -> Self {
        Self::Auto
    }
}

/// An inlined attachment on a `Request`: an image or file the user supplied
/// alongside their query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub mime_type: String,
    pub base64_data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    File,
}

/// A user-originated work item. Created once by the facade, consumed
/// exactly once by the Orchestrator, never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub trace_id: Uuid,
    pub query: String,
    pub mode: Mode,
    pub session_id: String,
    pub options: HashMap<String, Value>,
    pub attachments: Vec<Attachment>,
}

impl Request {
    #[must_use]
    pub fn new(query: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            trace_id: Uuid::new_v4(),
            query: query.into(),
            mode: Mode::Auto,
            session_id: session_id.into(),
            options: HashMap::new(),
            attachments: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// The `selected_docs` filter, if the caller set one in `options`.
    #[must_use]
    pub fn selected_docs(&self) -> Option<Vec<String>> {
        self.options.get("selected_docs").and_then(|v| {
            v.as_array().map(|arr| {
                arr.iter()
                    .filter_map(|x| x.as_str().map(String::from))
                    .collect()
            })
        })
    }

    #[must_use]
    pub fn has_image_attachments(&self) -> bool {
        self.attachments
            .iter()
            .any(|a| a.kind == AttachmentKind::Image)
    }

    #[must_use]
    pub fn has_file_attachments(&self) -> bool {
        self.attachments
            .iter()
            .any(|a| a.kind == AttachmentKind::File)
    }
}

/// A single message appended to a `Context`'s conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Per-session mutable state. History is append-only except for
/// oldest-drops once it exceeds `max_history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub session_id: String,
    pub user_id: String,
    pub permissions: Vec<String>,
    pub metadata: HashMap<String, Value>,
    pub conversation_history: Vec<ConversationMessage>,
    pub active_plugins: Vec<String>,
    pub max_history: usize,
    pub updated_at: DateTime<Utc>,
}

impl Context {
    #[must_use]
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>, max_history: usize) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            permissions: Vec::new(),
            metadata: HashMap::new(),
            conversation_history: Vec::new(),
            active_plugins: Vec::new(),
            max_history,
            updated_at: Utc::now(),
        }
    }

    /// Appends a timestamped message and drops the oldest entry if the
    /// history now exceeds `max_history`. This is the only mutator that may
    /// remove history entries, and it only ever removes from the front.
    pub fn push_message(&mut self, message: ConversationMessage) {
        self.conversation_history.push(message);
        while self.conversation_history.len() > self.max_history {
            self.conversation_history.remove(0);
        }
        self.updated_at = Utc::now();
    }
}

/// An Orchestrator-internal lift of a `Request` into the actor world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub parameters: HashMap<String, Value>,
    pub context: Context,
    pub trace_id: Uuid,
}

/// The kind of an observable `Event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Thinking,
    Plan,
    ToolCall,
    ToolResult,
    Answer,
    Source,
    Done,
    Error,
    Startup,
    Shutdown,
    Info,
}

/// A reference to a source document surfaced by retrieval, deduplicated by
/// `(file_name, page_label)` wherever sources are merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub file_name: String,
    pub page_label: Option<String>,
}

/// The strongly typed shapes `Event.payload.data` may hold, per the known
/// event kinds. `Opaque` covers genuinely vendor-specific data that has no
/// fixed shape (raw service results).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventData {
    Planning {
        summary: String,
        queries: Vec<String>,
        tasks: Vec<TaskSummary>,
    },
    Generating {
        context_chunks: usize,
        sources: usize,
    },
    ToolCall {
        arguments: Value,
        queries: Vec<String>,
        description: String,
    },
    ToolResult {
        preview: String,
        results_count: usize,
    },
    Answer {
        usage: Option<Usage>,
    },
    Source {
        sources: Vec<SourceRef>,
    },
    Vision,
    FileAnalysis,
    Opaque(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub tool: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The human-readable primary string plus optional structured detail
/// carried by every `Event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    pub content: String,
    pub data: Option<EventData>,
}

impl EventPayload {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(content: impl Into<String>, data: EventData) -> Self {
        Self {
            content: content.into(),
            data: Some(data),
        }
    }
}

/// The unit of observable progress streamed back to callers. Events are
/// produced by the Orchestrator (or Deep-Research Workflow) and delivered in
/// order per `correlation_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,
    pub payload: EventPayload,
    pub timestamp: EpochMillis,
    pub source: String,
    pub correlation_id: Uuid,
}

impl EventType {
    /// The snake_case key used to register/dispatch typed event handlers
    /// (matches the `serde` wire representation).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Thinking => "thinking",
            Self::Plan => "plan",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::Answer => "answer",
            Self::Source => "source",
            Self::Done => "done",
            Self::Error => "error",
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Info => "info",
        }
    }
}

impl Event {
    #[must_use]
    pub fn new(kind: EventType, source: impl Into<String>, correlation_id: Uuid, payload: EventPayload) -> Self {
        Self {
            kind,
            payload,
            timestamp: now_millis(),
            source: source.into(),
            correlation_id,
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self.kind, EventType::Done | EventType::Error)
    }
}

/// A unit of execution inside a `Plan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub tool: String,
    pub service: Option<String>,
    pub parameters: HashMap<String, Value>,
    pub dependencies: Vec<String>,
    pub description: String,
    pub timeout_secs: Option<u64>,
}

impl Task {
    #[must_use]
    pub fn new(id: impl Into<String>, tool: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            service: None,
            parameters: HashMap::new(),
            dependencies: Vec::new(),
            description: description.into(),
            timeout_secs: None,
        }
    }
}

/// Flags set by the Planner's preprocessing short-circuits so the
/// Orchestrator can take a dedicated path instead of the generic task loop.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpecialFlags {
    pub needs_vision: bool,
    pub needs_file_analysis: bool,
}

/// A dependency-ordered task plan. Produced once per request, immutable
/// thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub analysis: String,
    pub sub_questions: Vec<String>,
    pub tasks: Vec<Task>,
    pub execution_order: Vec<String>,
    pub reasoning: String,
    pub special_flags: SpecialFlags,
}

impl Plan {
    #[must_use]
    pub fn empty(analysis: impl Into<String>) -> Self {
        Self {
            analysis: analysis.into(),
            sub_questions: Vec::new(),
            tasks: Vec::new(),
            execution_order: Vec::new(),
            reasoning: String::new(),
            special_flags: SpecialFlags::default(),
        }
    }

    #[must_use]
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

/// A service registered in the MCP Gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub service_id: String,
    pub capabilities: Vec<String>,
    pub healthy: bool,
}

/// A Memory entry describing a previously successful plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: Uuid,
    pub name: String,
    pub trigger_patterns: Vec<String>,
    pub execution_template: HashMap<String, Value>,
    pub success_count: u64,
    pub failure_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl Skill {
    #[must_use]
    pub fn new(name: impl Into<String>, trigger_patterns: Vec<String>, execution_template: HashMap<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            trigger_patterns,
            execution_template,
            success_count: 0,
            failure_count: 0,
            created_at: now,
            last_used: now,
        }
    }
}

/// The lifecycle status of a `ResearchTask`; transitions only along
/// `Pending -> Running -> (Completed | Failed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchStep {
    pub step: String,
    pub status: StepStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub question: String,
    pub answer: String,
    pub sources_count: usize,
}

/// Durable state of a deep-research run. Owned exclusively by the
/// Deep-Research Workflow; readable by the facade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchTask {
    pub id: Uuid,
    pub topic: String,
    pub documents_filter: Option<Vec<String>>,
    pub status: ResearchStatus,
    pub progress: u8,
    pub steps: Vec<ResearchStep>,
    pub findings: Vec<Finding>,
    pub sources: Vec<SourceRef>,
    pub report: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ResearchTask {
    #[must_use]
    pub fn new(topic: impl Into<String>, documents_filter: Option<Vec<String>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            documents_filter,
            status: ResearchStatus::Pending,
            progress: 0,
            steps: Vec::new(),
            findings: Vec::new(),
            sources: Vec::new(),
            report: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Advances `progress` monotonically; a lower value is a no-op rather
    /// than a panic, so callers never need to track the high-water mark
    /// themselves.
    pub fn advance_progress(&mut self, progress: u8) {
        if progress > self.progress {
            self.progress = progress;
        }
    }
}

/// A retrieved chunk of source text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub file_name: String,
    pub page_label: Option<String>,
    pub chunk_index: usize,
    pub content_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    Vector,
    Bm25,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchInfo {
    pub vector_rank: Option<usize>,
    pub bm25_rank: Option<usize>,
    pub rrf_score: f32,
    pub rerank_score: Option<f32>,
    pub source: SearchSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
    pub search_info: SearchInfo,
}

impl Chunk {
    #[must_use]
    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            file_name: self.metadata.file_name.clone(),
            page_label: self.metadata.page_label.clone(),
        }
    }

    /// The first-100-character fusion identity used to merge vector/BM25
    /// ranked lists and to dedupe across `search_multiple` queries.
    #[must_use]
    pub fn fusion_key(&self) -> String {
        self.text.chars().take(100).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Retrieval {
    pub query: String,
    pub results: Vec<Chunk>,
    pub sources: Vec<SourceRef>,
}
