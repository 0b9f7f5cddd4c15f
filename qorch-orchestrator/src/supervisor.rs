//! Restart-budget tracking and crash containment for the Orchestrator's
//! four supervised children: Planner, Router, Executor pool, and Memory.
//! Every call into one of those children is routed through `supervise`,
//! which catches a panic during that call, counts it against the
//! child's restart budget, and converts it into `Error::ChildCrash`.
//! Once a child's budget is exceeded it is marked permanently stopped:
//! every later `supervise` call for that child short-circuits with the
//! same error rather than invoking the child again, matching the
//! specification's "exceeding the cap stops the child permanently"
//! restart policy.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use dashmap::{DashMap, DashSet};
use futures::FutureExt;
use qorch_core::{Error, Result};
use tracing::error;

pub struct Supervisor {
    restart_budget: u32,
    failures: DashMap<String, u32>,
    stopped: DashSet<String>,
}

impl Supervisor {
    #[must_use]
    pub fn new(restart_budget: u32) -> Self {
        Self {
            restart_budget,
            failures: DashMap::new(),
            stopped: DashSet::new(),
        }
    }

    /// Whether `child` has already exceeded its restart budget and been
    /// stopped permanently.
    #[must_use]
    pub fn is_stopped(&self, child: &str) -> bool {
        self.stopped.contains(child)
    }

    /// Runs `fut` under supervision on `child`'s behalf. A panic raised
    /// while polling `fut` is caught via `catch_unwind` and treated the
    /// same as a returned `Err`: both count as one crash toward `child`'s
    /// restart budget. A success clears the count. Once the count
    /// exceeds the budget, `child` is marked stopped and every
    /// subsequent call — including this one's caller, on its next
    /// invocation — fails fast with `Error::ChildCrash` without running
    /// `fut` again.
    pub async fn supervise<T, Fut>(&self, child: &str, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        if self.stopped.contains(child) {
            return Err(Error::ChildCrash {
                actor: child.to_string(),
                message: "child previously exceeded its restart budget and was stopped".to_string(),
            });
        }

        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(value)) => {
                self.failures.remove(child);
                Ok(value)
            }
            Ok(Err(err)) => Err(self.fail(child, err.to_string())),
            Err(panic) => Err(self.fail(child, panic_message(&panic))),
        }
    }

    fn fail(&self, child: &str, message: String) -> Error {
        let mut count = self.failures.entry(child.to_string()).or_insert(0);
        *count += 1;
        let restart_count = *count;

        if restart_count > self.restart_budget {
            self.stopped.insert(child.to_string());
            error!(
                child,
                restart_count,
                budget = self.restart_budget,
                %message,
                "child exceeded its restart budget, stopping permanently"
            );
        } else {
            error!(
                child,
                restart_count,
                budget = self.restart_budget,
                %message,
                "child crashed, restarting"
            );
        }

        Error::ChildCrash {
            actor: child.to_string(),
            message,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "child panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn escalates_only_after_budget_exhausted() {
        let supervisor = Supervisor::new(2);
        for _ in 0..2 {
            let result = supervisor.supervise::<(), _>("planner", async { Err(Error::business("boom")) }).await;
            assert!(result.is_err());
            assert!(!supervisor.is_stopped("planner"));
        }
        let result = supervisor.supervise::<(), _>("planner", async { Err(Error::business("boom")) }).await;
        assert!(result.is_err());
        assert!(supervisor.is_stopped("planner"));
    }

    #[tokio::test]
    async fn success_resets_the_failure_count() {
        let supervisor = Supervisor::new(1);
        let _ = supervisor.supervise::<(), _>("memory", async { Err(Error::business("e1")) }).await;
        let ok = supervisor.supervise("memory", async { Ok::<_, Error>(7) }).await;
        assert_eq!(ok.unwrap(), 7);
        let result = supervisor.supervise::<(), _>("memory", async { Err(Error::business("e2")) }).await;
        assert!(result.is_err());
        assert!(!supervisor.is_stopped("memory"));
    }

    #[tokio::test]
    async fn stopped_child_short_circuits_without_running_again() {
        let supervisor = Supervisor::new(0);
        let ran = AtomicUsize::new(0);

        let _ = supervisor
            .supervise::<(), _>("router", async {
                ran.fetch_add(1, Ordering::SeqCst);
                Err(Error::business("boom"))
            })
            .await;
        assert!(supervisor.is_stopped("router"));

        let result = supervisor
            .supervise("router", async {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_panic_is_caught_and_counted_as_a_crash() {
        let supervisor = Supervisor::new(0);
        let result = supervisor
            .supervise::<(), _>("executor_pool", async { panic!("simulated child panic") })
            .await;
        assert!(matches!(result, Err(Error::ChildCrash { .. })));
        assert!(supervisor.is_stopped("executor_pool"));
    }

    #[tokio::test]
    async fn children_are_tracked_independently() {
        let supervisor = Supervisor::new(0);
        let _ = supervisor.supervise::<(), _>("a", async { Err(Error::business("e")) }).await;
        let _ = supervisor.supervise::<(), _>("b", async { Err(Error::business("e")) }).await;
        assert!(supervisor.is_stopped("a"));
        assert!(supervisor.is_stopped("b"));
    }
}
