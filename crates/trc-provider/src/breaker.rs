//! Per-provider circuit breaker.
//!
//! `closed → open` once consecutive failures reach the threshold;
//! `open → half-open` after the recovery window; `half-open → closed` on the
//! first probe success; `half-open → open` after the configured number of
//! failed probes. Execution while `open` fails immediately with
//! [`ProviderError::CircuitOpen`].

use crate::ProviderError;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Breaker tuning.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing.
    pub recovery_after: Duration,
    /// Failed probes tolerated in half-open before re-opening.
    pub half_open_probes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_after: Duration::from_secs(30),
            half_open_probes: 1,
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing fast.
    Open,
    /// Probing for recovery.
    HalfOpen,
}

#[derive(Debug)]
enum Inner {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { failed_probes: u32 },
}

/// Process-wide circuit breaker for one provider. Safe under concurrent use.
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker for `provider`.
    pub fn new(provider: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            provider: provider.into(),
            config,
            inner: Mutex::new(Inner::Closed { failures: 0 }),
        }
    }

    /// Current state, transitioning `open → half-open` when the recovery
    /// window has elapsed.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().expect("breaker lock");
        if let Inner::Open { since } = *inner {
            if since.elapsed() >= self.config.recovery_after {
                *inner = Inner::HalfOpen { failed_probes: 0 };
            }
        }
        match *inner {
            Inner::Closed { .. } => CircuitState::Closed,
            Inner::Open { .. } => CircuitState::Open,
            Inner::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Gate an execution attempt. Fails fast while open.
    pub fn check(&self) -> Result<(), ProviderError> {
        match self.state() {
            CircuitState::Open => Err(ProviderError::CircuitOpen(self.provider.clone())),
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock");
        match *inner {
            Inner::Closed { .. } => *inner = Inner::Closed { failures: 0 },
            // First probe success closes the circuit.
            Inner::HalfOpen { .. } => *inner = Inner::Closed { failures: 0 },
            Inner::Open { .. } => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock");
        match *inner {
            Inner::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    *inner = Inner::Open {
                        since: Instant::now(),
                    };
                } else {
                    *inner = Inner::Closed { failures };
                }
            }
            Inner::HalfOpen { failed_probes } => {
                let failed_probes = failed_probes + 1;
                if failed_probes >= self.config.half_open_probes {
                    *inner = Inner::Open {
                        since: Instant::now(),
                    };
                } else {
                    *inner = Inner::HalfOpen { failed_probes };
                }
            }
            Inner::Open { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            recovery_after: Duration::from_secs(10),
            half_open_probes: 2,
        }
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new("openai", config());
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(matches!(
            breaker.check(),
            Err(ProviderError::CircuitOpen(p)) if p == "openai"
        ));
    }

    #[tokio::test]
    async fn success_resets_consecutive_count() {
        let breaker = CircuitBreaker::new("openai", config());
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_after_recovery_then_closes_on_probe_success() {
        tokio::time::pause();
        let breaker = CircuitBreaker::new("openai", config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.check().is_ok());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_reopens_after_failed_probes() {
        tokio::time::pause();
        let breaker = CircuitBreaker::new("openai", config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
