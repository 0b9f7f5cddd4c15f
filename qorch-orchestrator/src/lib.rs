//! The Orchestrator actor hierarchy: the per-request supervisor
//! (`orchestrator`), the LLM/rule-based task planner (`planner`), the
//! tool-to-service router (`router`), the retrying executor pool
//! (`executor`), attachment text extraction (`file_extraction`), and the
//! child restart-budget tracker (`supervisor`).

pub mod executor;
pub mod file_extraction;
pub mod orchestrator;
pub mod planner;
pub mod router;
pub mod supervisor;

pub use executor::{ExecutorPool, TaskOutcome};
pub use file_extraction::{extract_text, FileExtractor, PlaceholderFileExtractor};
pub use orchestrator::Orchestrator;
pub use planner::Planner;
pub use router::Router;
pub use supervisor::Supervisor;
