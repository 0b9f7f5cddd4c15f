//! Layered configuration for the orchestration core.
//!
//! Load order (lowest to highest precedence): defaults embedded below,
//! an optional TOML file, then environment variables prefixed `QORCH_`
//! (double-underscore separated, e.g. `QORCH_GATEWAY__FAILURE_THRESHOLD=3`).
//! Every tunable named across the specification's component sections lives
//! in one of the per-subsystem structs here; nothing re-validates its own
//! config at call time, matching the "validate once, at construction"
//! policy.

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use qorch_core::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewaySettings {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub health_interval_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
            health_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrieverSettings {
    pub rrf_k: f32,
    pub bm25_k1: f32,
    pub bm25_b: f32,
    pub rerank_factor: usize,
    pub no_rerank_factor: usize,
    pub bm25_index_cap: usize,
    pub default_top_k: usize,
    pub use_rerank_by_default: bool,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            bm25_k1: 1.5,
            bm25_b: 0.75,
            rerank_factor: 4,
            no_rerank_factor: 2,
            bm25_index_cap: 1000,
            default_top_k: 10,
            use_rerank_by_default: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub executor_pool_size: usize,
    pub executor_default_timeout_secs: u64,
    pub executor_max_retries: u32,
    pub task_wait_cap_secs: u64,
    pub stream_timeout_secs: u64,
    pub child_restart_budget: u32,
    pub mailbox_capacity: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            executor_pool_size: 5,
            executor_default_timeout_secs: 30,
            executor_max_retries: 2,
            task_wait_cap_secs: 30,
            stream_timeout_secs: 60,
            child_restart_budget: 3,
            mailbox_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResearchSettings {
    pub min_sub_questions: usize,
    pub max_sub_questions: usize,
    pub max_review_extra_queries: usize,
    pub max_reviews: usize,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            min_sub_questions: 3,
            max_sub_questions: 5,
            max_review_extra_queries: 2,
            max_reviews: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextSettings {
    pub max_history: usize,
    pub default_ttl_secs: u64,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_history: 50,
            default_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemorySettings {
    pub max_session_history: usize,
    pub max_skills: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            max_session_history: 50,
            max_skills: 200,
        }
    }
}

/// The root settings object, one field per subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub gateway: GatewaySettings,
    pub retriever: RetrieverSettings,
    pub orchestrator: OrchestratorSettings,
    pub research: ResearchSettings,
    pub context: ContextSettings,
    pub memory: MemorySettings,
}

impl Settings {
    /// Loads settings from the embedded defaults, optionally merging a TOML
    /// file at `path` (ignored if it doesn't exist), then environment
    /// variables prefixed `QORCH_`. Fails fast with
    /// `Error::Configuration` on a malformed source; never re-validated
    /// later.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let defaults_json = serde_json::to_string(&defaults)
            .map_err(|e| Error::configuration(format!("failed to serialize defaults: {e}")))?;

        let mut builder =
            Config::builder().add_source(File::from_str(&defaults_json, FileFormat::Json));

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(File::from(path));
            }
        }

        let builder = builder.add_source(
            Environment::with_prefix("QORCH")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| Error::configuration(format!("failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| Error::configuration(format!("failed to deserialize config: {e}")))
    }

    /// Convenience constructor for tests and for callers that have no
    /// config file: embedded defaults plus environment overrides only.
    pub fn load_default() -> Result<Self> {
        Self::load(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_specification_values() {
        let settings = Settings::default();
        assert_eq!(settings.gateway.failure_threshold, 5);
        assert_eq!(settings.gateway.recovery_timeout_secs, 60);
        assert_eq!(settings.retriever.rrf_k, 60.0);
        assert_eq!(settings.retriever.bm25_k1, 1.5);
        assert_eq!(settings.retriever.bm25_b, 0.75);
        assert_eq!(settings.orchestrator.executor_pool_size, 5);
        assert_eq!(settings.orchestrator.executor_max_retries, 2);
        assert_eq!(settings.research.max_review_extra_queries, 2);
    }

    #[test]
    fn load_default_matches_struct_default() {
        let loaded = Settings::load_default().expect("config loads");
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let loaded =
            Settings::load(Some(Path::new("/nonexistent/qorch.toml"))).expect("config loads");
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("qorch.toml");
        std::fs::write(&path, "[gateway]\nfailure_threshold = 9\n").expect("write config");

        let loaded = Settings::load(Some(&path)).expect("config loads");
        assert_eq!(loaded.gateway.failure_threshold, 9);
        assert_eq!(loaded.gateway.recovery_timeout_secs, 60);
    }
}
