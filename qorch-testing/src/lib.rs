//! Fixtures and fake collaborators shared by every other crate's test
//! suite, grounded on the teacher workspace's `llmspell-core::mocks`
//! pattern: hand-written structs holding interior-mutable state rather
//! than a mocking-framework derive, since every collaborator trait here
//! is `async_trait` and scripted with scenario-specific behavior (fail
//! N times then succeed, respond with a canned value, fail forever)
//! rather than call-count assertions.
//!
//! Gated behind Cargo features so a consumer can compile exactly the
//! suite it needs: `unit-tests`, `integration-tests`, `scenario-tests`,
//! `property-tests` (see `Cargo.toml`). The fixtures themselves are
//! always available, independent of those features, since every
//! downstream crate's `#[cfg(test)]` module depends on `qorch-testing`
//! as a dev-dependency.

pub mod llm;
pub mod providers;
pub mod service;

pub use llm::FakeLlmProvider;
pub use providers::{FakeEmbedder, FakeReranker};
pub use service::FakeService;
