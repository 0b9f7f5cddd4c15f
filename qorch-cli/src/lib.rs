//! Command-line facade library for the query orchestrator core.

pub mod cli;
pub mod commands;
pub mod demo;
pub mod output;
pub mod runtime;

pub use cli::OutputFormat;
