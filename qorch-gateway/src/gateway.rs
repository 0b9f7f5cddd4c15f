//! The service registry: `register`/`unregister`, the `call` hot path, a
//! background health prober, and read-only `discover_services`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use qorch_core::{Error, Result};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::circuit_breaker::{BreakerConfig, CircuitBreaker};
use crate::service::Service;

struct Entry {
    service: Arc<dyn Service>,
    breaker: CircuitBreaker,
    healthy: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct ServiceSummary {
    pub id: String,
    pub capabilities: Vec<String>,
    pub healthy: bool,
}

/// The MCP Gateway. Construct once at startup, share via `Arc` with the
/// Router and Executor actors.
pub struct Gateway {
    entries: DashMap<String, Entry>,
    breaker_config: BreakerConfig,
    health_interval: Duration,
    prober: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Gateway {
    #[must_use]
    pub fn new(breaker_config: BreakerConfig, health_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            breaker_config,
            health_interval,
            prober: std::sync::Mutex::new(None),
        })
    }

    pub async fn register(&self, service: Arc<dyn Service>) -> Result<()> {
        service.initialize().await?;
        let id = service.service_id().to_string();
        self.entries.insert(
            id.clone(),
            Entry {
                service,
                breaker: CircuitBreaker::new(self.breaker_config),
                healthy: AtomicBool::new(true),
            },
        );
        info!(service_id = %id, "registered service with gateway");
        Ok(())
    }

    pub async fn unregister(&self, service_id: &str) -> Result<()> {
        if let Some((_, entry)) = self.entries.remove(service_id) {
            entry.service.shutdown().await?;
            info!(service_id, "unregistered service from gateway");
        }
        Ok(())
    }

    /// The Gateway's hot path. Fails fast with `ServiceNotFound` if the
    /// service id is unregistered, with `CircuitOpen` if the breaker is
    /// open and the recovery window hasn't elapsed, otherwise calls
    /// through and records the outcome on the breaker. Never retries —
    /// that is the Executor's job.
    pub async fn call(&self, service_id: &str, method: &str, params: Value) -> Result<Value> {
        debug!(service_id, method, "gateway call");
        let entry = self
            .entries
            .get(service_id)
            .ok_or_else(|| Error::ServiceNotFound {
                service_id: service_id.to_string(),
            })?;

        if !entry.breaker.can_execute() {
            warn!(service_id, "circuit open, rejecting call");
            return Err(Error::CircuitOpen {
                service_id: service_id.to_string(),
            });
        }

        match entry.service.execute(method, params).await {
            Ok(result) => {
                entry.breaker.record_success();
                Ok(result)
            }
            Err(err) => {
                entry.breaker.record_failure();
                error!(service_id, method, error = %err, "gateway call failed");
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn discover_services(&self) -> Vec<ServiceSummary> {
        self.entries
            .iter()
            .map(|kv| ServiceSummary {
                id: kv.key().clone(),
                capabilities: kv.value().service.capabilities().to_vec(),
                healthy: kv.value().healthy.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// A snapshot of which services currently have an open circuit
    /// breaker, keyed by service id.
    #[must_use]
    pub fn breaker_states(&self) -> HashMap<String, crate::circuit_breaker::BreakerState> {
        self.entries
            .iter()
            .map(|kv| (kv.key().clone(), kv.value().breaker.state()))
            .collect()
    }

    /// Starts the background health prober, calling `health_check` on
    /// every registered service every `health_interval`. Unhealthy
    /// services are flagged but never auto-unregistered.
    pub fn start_health_prober(self: &Arc<Self>) {
        let gateway = Arc::clone(self);
        let interval = self.health_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for kv in gateway.entries.iter() {
                    let healthy = kv.value().service.health_check().await;
                    kv.value().healthy.store(healthy, Ordering::Relaxed);
                    if !healthy {
                        warn!(service_id = kv.key(), "health check reports unhealthy");
                    }
                }
            }
        });
        *self.prober.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);
    }

    pub fn stop_health_prober(&self) {
        if let Some(handle) = self
            .prober
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct FlakyService {
        id: String,
        fail_first_n: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Service for FlakyService {
        fn service_id(&self) -> &str {
            &self.id
        }

        fn capabilities(&self) -> &[String] {
            &[]
        }

        async fn initialize(&self) -> Result<()> {
            Ok(())
        }

        async fn execute(&self, _method: &str, _params: Value) -> Result<Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                Err(Error::TransientTransport {
                    origin: self.id.clone(),
                    message: "simulated failure".into(),
                })
            } else {
                Ok(Value::Null)
            }
        }

        async fn health_check(&self) -> bool {
            true
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unknown_service_fails_fast() {
        let gateway = Gateway::new(BreakerConfig::default(), Duration::from_secs(30));
        let err = gateway.call("missing", "m", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::ServiceNotFound { .. }));
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold_and_blocks_further_calls() {
        let gateway = Gateway::new(
            BreakerConfig {
                failure_threshold: 3,
                recovery_timeout: Duration::from_secs(60),
            },
            Duration::from_secs(30),
        );
        gateway
            .register(Arc::new(FlakyService {
                id: "web_search".into(),
                fail_first_n: 10,
                calls: AtomicU32::new(0),
            }))
            .await
            .unwrap();

        for _ in 0..3 {
            assert!(gateway.call("web_search", "search", Value::Null).await.is_err());
        }

        let err = gateway
            .call("web_search", "search", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CircuitOpen { .. }));
    }

    #[tokio::test]
    async fn success_resets_breaker() {
        let gateway = Gateway::new(
            BreakerConfig {
                failure_threshold: 2,
                recovery_timeout: Duration::from_secs(60),
            },
            Duration::from_secs(30),
        );
        gateway
            .register(Arc::new(FlakyService {
                id: "svc".into(),
                fail_first_n: 1,
                calls: AtomicU32::new(0),
            }))
            .await
            .unwrap();

        assert!(gateway.call("svc", "m", Value::Null).await.is_err());
        assert!(gateway.call("svc", "m", Value::Null).await.is_ok());
        assert_eq!(
            gateway.breaker_states()["svc"],
            crate::circuit_breaker::BreakerState::Closed
        );
    }
}
