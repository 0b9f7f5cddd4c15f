//! The Executor actor pool: wraps Gateway calls in a timeout, retries with
//! linear backoff, and never propagates failure past the pool — a task's
//! outcome is always a value, success or otherwise, so the Orchestrator's
//! task loop can keep going.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use qorch_core::model::Task;
use qorch_gateway::Gateway;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, warn};

use crate::router::Router;

/// The result of running one task through the pool: either the Gateway's
/// response value, or a failure description after retries are exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl TaskOutcome {
    #[must_use]
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

pub struct ExecutorPool {
    gateway: Arc<Gateway>,
    pool_size: usize,
    cursor: AtomicUsize,
    default_timeout: Duration,
    max_retries: u32,
}

impl ExecutorPool {
    #[must_use]
    pub fn new(gateway: Arc<Gateway>, pool_size: usize, default_timeout: Duration, max_retries: u32) -> Self {
        Self {
            gateway,
            pool_size: pool_size.max(1),
            cursor: AtomicUsize::new(0),
            default_timeout,
            max_retries,
        }
    }

    /// Picks the next executor slot round-robin, purely for tracing /
    /// observability; every slot shares the same Gateway.
    fn next_slot(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed) % self.pool_size
    }

    /// Resolves the task's service, calls the Gateway under a timeout, and
    /// retries on timeout or transient failure, sleeping `attempt` seconds
    /// between attempts.
    pub async fn execute_task(&self, task: &Task) -> TaskOutcome {
        let slot = self.next_slot();
        let service_id = task
            .service
            .clone()
            .unwrap_or_else(|| Router::resolve_service(&task.tool).to_string());
        let timeout = task
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);
        let params = serde_json::to_value(&task.parameters).unwrap_or(Value::Null);

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            match tokio::time::timeout(
                timeout,
                self.gateway.call(&service_id, &task.tool, params.clone()),
            )
            .await
            {
                Ok(Ok(value)) => return TaskOutcome::ok(value),
                Ok(Err(err)) => {
                    last_error = err.to_string();
                    warn!(slot, task_id = %task.id, attempt, error = %last_error, "task execution failed");
                }
                Err(_) => {
                    last_error = format!("task '{}' timed out after {timeout:?}", task.id);
                    warn!(slot, task_id = %task.id, attempt, "task execution timed out");
                }
            }

            if attempt < self.max_retries {
                tokio::time::sleep(Duration::from_secs(u64::from(attempt) + 1)).await;
            }
        }

        error!(task_id = %task.id, error = %last_error, "task execution exhausted retries");
        TaskOutcome::failed(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use qorch_gateway::circuit_breaker::BreakerConfig;
    use qorch_gateway::Service;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration as StdDuration;

    struct CountingService {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl Service for CountingService {
        fn service_id(&self) -> &str {
            "knowledge"
        }

        fn capabilities(&self) -> &[String] {
            &[]
        }

        async fn initialize(&self) -> qorch_core::Result<()> {
            Ok(())
        }

        async fn execute(&self, _method: &str, _params: Value) -> qorch_core::Result<Value> {
            let count = self.calls.fetch_add(1, Ordering::SeqCst);
            if count < self.fail_first {
                return Err(qorch_core::Error::business("simulated failure"));
            }
            Ok(serde_json::json!({"ok": true}))
        }

        async fn health_check(&self) -> bool {
            true
        }

        async fn shutdown(&self) -> qorch_core::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let gateway = Gateway::new(BreakerConfig::default(), StdDuration::from_secs(60));
        gateway
            .register(Arc::new(CountingService {
                calls: AtomicU32::new(0),
                fail_first: 1,
            }))
            .await
            .unwrap();

        let pool = ExecutorPool::new(gateway, 5, StdDuration::from_secs(5), 2);
        let mut task = Task::new("task_1", "rag_search", "search the knowledge base");
        task.service = Some("knowledge".to_string());

        let outcome = pool.execute_task(&task).await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn exhausts_retries_and_reports_failure() {
        let gateway = Gateway::new(BreakerConfig::default(), StdDuration::from_secs(60));
        gateway
            .register(Arc::new(CountingService {
                calls: AtomicU32::new(0),
                fail_first: 100,
            }))
            .await
            .unwrap();

        let pool = ExecutorPool::new(gateway, 5, StdDuration::from_secs(5), 1);
        let mut task = Task::new("task_1", "rag_search", "search the knowledge base");
        task.service = Some("knowledge".to_string());

        let outcome = pool.execute_task(&task).await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }
}
