use thiserror::Error;

/// The single error type returned across every core crate boundary.
///
/// Mirrors the error-kind table of the orchestrator specification: each
/// variant names the policy (retry, fail-fast, degrade) applied by its
/// caller rather than leaving that decision to be inferred from a string.
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// A collaborator call (Gateway, LLM, retriever I/O) failed in a way the
    /// Executor should retry with backoff.
    #[error("transient transport error calling {origin}: {message}")]
    TransientTransport { origin: String, message: String },

    /// The Gateway rejected a call because the circuit breaker for
    /// `service_id` is open.
    #[error("circuit open for service '{service_id}'")]
    CircuitOpen { service_id: String },

    /// An Executor task or the outer request stream exceeded its deadline.
    #[error("timeout after {after_secs}s")]
    Timeout { after_secs: u64 },

    /// Validation failure, unknown method, or invalid JSON that is not
    /// retried; callers fall back to a degraded path instead.
    #[error("business error: {message}")]
    BusinessError { message: String },

    /// An actor panicked or returned a fatal error; the supervisor decides
    /// whether to restart based on its restart budget.
    #[error("child '{actor}' crashed: {message}")]
    ChildCrash { actor: String, message: String },

    /// The final answer-synthesis LLM call failed; callers emit a
    /// diagnostic ANSWER event rather than propagating this further.
    #[error("answer synthesis failed: {message}")]
    UserFacingAnswerFailure { message: String },

    /// The Gateway has no service registered under this id.
    #[error("service '{service_id}' not found")]
    ServiceNotFound { service_id: String },

    /// A durable backing store is unavailable; the caller degrades to a
    /// local-only / in-memory fallback instead of failing.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// A configuration value was missing or invalid at construction time.
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl Error {
    #[must_use]
    pub fn business(message: impl Into<String>) -> Self {
        Self::BusinessError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether this error represents a transient condition an Executor
    /// should retry (as opposed to a business error or an already-final
    /// circuit-open rejection).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientTransport { .. } | Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
