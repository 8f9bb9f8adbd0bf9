//! Bounded retry with exponential backoff and symmetric jitter.

use std::time::Duration;

/// Retry tuning.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Symmetric jitter fraction in `[0, 1]`.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(20),
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    /// The delay before retrying after failed attempt number `attempt`
    /// (0-based): `base · 2^attempt` capped at `max_delay`, with symmetric
    /// jitter `± jitter_factor`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = (self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(20) as i32))
            .min(self.max_delay.as_secs_f64());
        let jitter = 1.0 + self.jitter_factor * jitter_unit();
        Duration::from_secs_f64((exp * jitter).max(0.0))
    }

    /// Whether a retry is allowed after failed attempt number `attempt`.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

/// A cheap jitter source in `[-1, 1]` derived from the clock's sub-second
/// nanoseconds.
fn jitter_unit() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    f64::from(nanos) / f64::from(u32::MAX) * 2.0 - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let c = config();
        assert_eq!(c.delay_for(0), Duration::from_millis(100));
        assert_eq!(c.delay_for(1), Duration::from_millis(200));
        assert_eq!(c.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn backoff_is_capped() {
        let c = config();
        assert_eq!(c.delay_for(10), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let c = RetryConfig {
            jitter_factor: 0.5,
            ..config()
        };
        for attempt in 0..4 {
            let nominal = config().delay_for(attempt).as_secs_f64();
            let jittered = c.delay_for(attempt).as_secs_f64();
            assert!(jittered >= nominal * 0.5 - f64::EPSILON);
            assert!(jittered <= nominal * 1.5 + f64::EPSILON);
        }
    }

    #[test]
    fn retry_budget_excludes_last_attempt() {
        let c = config();
        assert!(c.allows_retry(0));
        assert!(c.allows_retry(2));
        assert!(!c.allows_retry(3));
    }
}
