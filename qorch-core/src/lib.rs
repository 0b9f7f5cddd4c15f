//! Shared data model and error types for the query orchestrator core.
//!
//! Every other crate in the workspace depends on `qorch-core` for its
//! `Result`/`Error` type and for the entities described in the
//! specification's data-model section (`Request`, `Context`, `Intent`,
//! `Event`, `Task`, `Plan`, `ServiceDescriptor`, `Skill`, `ResearchTask`,
//! `Chunk`/`Retrieval`). No component-specific behavior lives here.

pub mod error;
pub mod model;

pub use error::{Error, Result};
pub use model::*;
