//! CLI argument parsing and command structures.
//!
//! ## Command Hierarchy
//!
//! ```text
//! qorch [GLOBAL_FLAGS] <COMMAND>
//! ├── ask <query>                 # Route a single query through the Orchestrator
//! ├── research <topic>            # Run the deep-research workflow to completion
//! └── config {show}               # Inspect the effective layered configuration
//! ```
//!
//! ## Usage Examples
//!
//! ```bash
//! qorch ask "What is RAG?" --mode knowledge --doc rag.pdf
//! qorch --output json research "CLIP training"
//! qorch config show --section gateway
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Trace level for logging output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TraceLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<TraceLevel> for tracing::Level {
    fn from(trace_level: TraceLevel) -> Self {
        match trace_level {
            TraceLevel::Off | TraceLevel::Error => tracing::Level::ERROR,
            TraceLevel::Warn => tracing::Level::WARN,
            TraceLevel::Info => tracing::Level::INFO,
            TraceLevel::Debug => tracing::Level::DEBUG,
            TraceLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// The explicit mode a caller may request, mirroring `qorch_core::model::Mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum ModeArg {
    Chat,
    Thinking,
    Knowledge,
    Search,
    Code,
    #[value(name = "deep-research")]
    DeepResearch,
    #[default]
    Auto,
}

impl From<ModeArg> for qorch_core::model::Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Chat => Self::Chat,
            ModeArg::Thinking => Self::Thinking,
            ModeArg::Knowledge => Self::Knowledge,
            ModeArg::Search => Self::Search,
            ModeArg::Code => Self::Code,
            ModeArg::DeepResearch => Self::DeepResearch,
            ModeArg::Auto => Self::Auto,
        }
    }
}

/// Command-line interface for the query orchestrator core.
#[derive(Parser, Debug)]
#[command(name = "qorch")]
#[command(version)]
#[command(about = "Multi-mode intelligent query orchestrator")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (GLOBAL)
    #[arg(short = 'c', long, global = true, env = "QORCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Trace level (replaces --debug/--verbose)
    #[arg(long, global = true, value_enum, default_value = "warn")]
    pub trace: TraceLevel,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Route a single query through the Orchestrator and stream its events
    #[command(long_about = "Submit one query and print the event stream as it arrives.

EXAMPLES:
    qorch ask \"list files in current directory\"
    qorch ask \"What is RAG?\" --mode knowledge --doc rag.pdf
    qorch --output json ask \"how does it work\" --session s1")]
    Ask {
        /// The query text
        query: String,

        /// Explicit processing mode (defaults to auto-detection)
        #[arg(long, value_enum, default_value = "auto")]
        mode: ModeArg,

        /// Session id to scope conversation history under (generated if omitted)
        #[arg(long)]
        session: Option<String>,

        /// Restrict knowledge-base retrieval to this document (repeatable)
        #[arg(long = "doc", value_name = "FILE_NAME")]
        docs: Vec<String>,
    },

    /// Run the deep-research workflow on a topic to completion
    #[command(long_about = "Decompose a topic into sub-questions, research each, and print the final cited report.

EXAMPLES:
    qorch research \"CLIP training\"
    qorch research \"BERT pretraining\" --doc paper.pdf")]
    Research {
        /// The research topic
        topic: String,

        /// Restrict retrieval to this document (repeatable)
        #[arg(long = "doc", value_name = "FILE_NAME")]
        docs: Vec<String>,
    },

    /// Configuration management
    #[command(long_about = "Inspect the effective layered configuration.

EXAMPLES:
    qorch config show
    qorch config show --section retriever")]
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration (defaults, file, and environment merged)
    Show {
        /// Show only one top-level section (gateway, retriever, orchestrator, research, context, memory)
        section: Option<String>,
    },
}
