//! Per-service circuit breaker, grounded on the teacher workspace's hook
//! circuit breaker: an atomic-free `parking_lot::Mutex`-guarded state
//! machine rather than lock-free counters, since breaker transitions here
//! are driven by the Gateway's single `call` hot path rather than a
//! high-frequency hook pipeline.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

struct Inner {
    state: BreakerState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Transitions: `closed -> open` at `failure_count >= failure_threshold`;
/// `open -> half_open` once `recovery_timeout` has elapsed since the last
/// failure; `half_open -> closed` on success; `half_open -> open` on
/// failure. Calls are blocked in `open`; exactly one trial is allowed in
/// `half_open` (the next `can_execute` after the trial's `record_*` call
/// reflects the new state).
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure_time: None,
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Whether a call is currently allowed. Performs the
    /// `open -> half_open` transition as a side effect when the recovery
    /// window has elapsed, so a caller only needs to check this once per
    /// call attempt.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure_time
                    .is_some_and(|t| t.elapsed() >= self.config.recovery_timeout);
                if elapsed {
                    inner.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = 0;
        inner.state = BreakerState::Closed;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure_time = Some(Instant::now());
        if inner.state == BreakerState::HalfOpen || inner.failure_count >= self.config.failure_threshold {
            inner.state = BreakerState::Open;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
        });
        for _ in 0..2 {
            breaker.record_failure();
            assert!(breaker.can_execute());
        }
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn half_open_after_recovery_timeout_elapses() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(10),
        });
        breaker.record_failure();
        assert!(!breaker.can_execute());
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(1),
        });
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.can_execute());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn half_open_success_closes() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(1),
        });
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.can_execute());
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
