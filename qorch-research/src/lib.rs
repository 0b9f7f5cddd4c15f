//! Deep-research workflow: decomposes a topic into sub-questions, answers
//! each against a hybrid retriever, runs one capped adaptive review round,
//! and composes a cited final report.
//!
//! Independent of the generic Orchestrator plan/execute loop — a
//! `ResearchTask` runs to completion on its own background task and is
//! polled or subscribed to separately, matching the specification's
//! "asynchronous, long-running" framing for deep research.

pub mod citation;
pub mod workflow;

pub use citation::{analyze_citations, format_citation_report, CitationAnalysis, CitationStats, Reference};
pub use workflow::{ResearchTaskSummary, ResearchWorkflow};
