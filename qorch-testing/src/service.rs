//! A scriptable `qorch_gateway::Service` fake: per-method outcome scripts
//! (respond, fail), an overridable health bit, and call counters, enough
//! to drive the circuit-breaker (S3), retry, and health-probe tests
//! without a real sandbox/search/knowledge backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use qorch_core::{Error, Result};
use qorch_gateway::service::Service;
use serde_json::Value;

#[derive(Clone)]
enum Outcome {
    Ok(Value),
    TransientFailure(String),
}

pub struct FakeService {
    id: String,
    capabilities: Vec<String>,
    scripts: Mutex<HashMap<String, Vec<Outcome>>>,
    default_response: Value,
    call_counts: Mutex<HashMap<String, usize>>,
    healthy: AtomicBool,
    initialized: AtomicBool,
    shutdown: AtomicBool,
    total_calls: AtomicUsize,
}

impl FakeService {
    #[must_use]
    pub fn new(id: impl Into<String>, capabilities: Vec<String>) -> Self {
        Self {
            id: id.into(),
            capabilities,
            scripts: Mutex::new(HashMap::new()),
            default_response: serde_json::json!({}),
            call_counts: Mutex::new(HashMap::new()),
            healthy: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            total_calls: AtomicUsize::new(0),
        }
    }

    /// Every call to `method` returns `response` until reconfigured.
    #[must_use]
    pub fn always_ok(self, method: impl Into<String>, response: Value) -> Self {
        self.scripts.lock().insert(method.into(), vec![Outcome::Ok(response)]);
        self
    }

    /// Every call to `method` fails with a transient-transport error,
    /// driving the Gateway's circuit breaker toward `open`.
    #[must_use]
    pub fn always_failing(self, method: impl Into<String>, message: impl Into<String>) -> Self {
        self.scripts
            .lock()
            .insert(method.into(), vec![Outcome::TransientFailure(message.into())]);
        self
    }

    /// Fails `failures` times, then returns `response` forever after.
    #[must_use]
    pub fn failing_then_succeeding(self, method: impl Into<String>, failures: usize, response: Value) -> Self {
        let mut script: Vec<Outcome> = (0..failures)
            .map(|i| Outcome::TransientFailure(format!("simulated failure #{i}")))
            .collect();
        script.push(Outcome::Ok(response));
        self.scripts.lock().insert(method.into(), script);
        self
    }

    #[must_use]
    pub fn unhealthy(self) -> Self {
        self.healthy.store(false, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn call_count(&self, method: &str) -> usize {
        self.call_counts.lock().get(method).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn was_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for FakeService {
    fn service_id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn initialize(&self) -> Result<()> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(&self, method: &str, _params: Value) -> Result<Value> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let index = {
            let mut counts = self.call_counts.lock();
            let count = counts.entry(method.to_string()).or_insert(0);
            let current = *count;
            *count += 1;
            current
        };

        let scripts = self.scripts.lock();
        let Some(script) = scripts.get(method) else {
            return Ok(self.default_response.clone());
        };
        let outcome = script.get(index).or_else(|| script.last()).cloned();
        drop(scripts);

        match outcome {
            Some(Outcome::Ok(value)) => Ok(value),
            Some(Outcome::TransientFailure(message)) => Err(Error::TransientTransport {
                origin: self.id.clone(),
                message,
            }),
            None => Ok(self.default_response.clone()),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_ok_returns_the_configured_response_repeatedly() {
        let service = FakeService::new("knowledge", vec!["rag_search".to_string()])
            .always_ok("rag_search", serde_json::json!({"results": []}));
        service.initialize().await.unwrap();
        let first = service.execute("rag_search", serde_json::json!({})).await.unwrap();
        let second = service.execute("rag_search", serde_json::json!({})).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(service.call_count("rag_search"), 2);
    }

    #[tokio::test]
    async fn failing_then_succeeding_recovers_on_schedule() {
        let service = FakeService::new("sandbox", vec!["execute_bash".to_string()])
            .failing_then_succeeding("execute_bash", 1, serde_json::json!({"stdout": "ok"}));
        assert!(service.execute("execute_bash", serde_json::json!({})).await.is_err());
        assert!(service.execute("execute_bash", serde_json::json!({})).await.is_ok());
    }
}
