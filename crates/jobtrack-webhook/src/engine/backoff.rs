//! Exponential backoff schedule for conflict retries.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::RetrySection;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub factor: f64,
    /// Fraction of the base delay added on top, sampled in `[0, jitter]`.
    pub jitter: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(10),
            factor: 5.0,
            jitter: 0.1,
            max_backoff: Duration::from_millis(1_000),
        }
    }
}

impl From<&RetrySection> for RetryPolicy {
    fn from(s: &RetrySection) -> Self {
        Self {
            max_attempts: s.max_attempts,
            initial_backoff: Duration::from_millis(s.initial_backoff_ms),
            factor: s.factor,
            jitter: s.jitter,
            max_backoff: Duration::from_millis(s.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Retry as fast as possible; for tests that want many attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            factor: 1.0,
            jitter: 0.0,
            max_backoff: Duration::ZERO,
        }
    }

    /// Base delay before retry number `retry` (1-based), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exp = self.factor.powi(retry.saturating_sub(1) as i32);
        let secs = self.initial_backoff.as_secs_f64() * exp;
        let capped = secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Delay before retry number `retry`, with jitter applied.
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        // Pseudo-random fraction from the clock; good enough to spread retries.
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        let frac = f64::from(nanos % 1000) / 1000.0;
        base + base.mul_f64(self.jitter * frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_grows_by_factor() {
        let p = RetryPolicy::default();
        assert_eq!(p.base_delay(1), Duration::from_millis(10));
        assert_eq!(p.base_delay(2), Duration::from_millis(50));
        assert_eq!(p.base_delay(3), Duration::from_millis(250));
    }

    #[test]
    fn schedule_is_capped() {
        let p = RetryPolicy::default();
        assert_eq!(p.base_delay(10), Duration::from_millis(1_000));
    }

    #[test]
    fn jitter_stays_within_fraction() {
        let p = RetryPolicy::default();
        for retry in 1..=3 {
            let base = p.base_delay(retry);
            let d = p.delay(retry);
            assert!(d >= base);
            assert!(d <= base + base.mul_f64(p.jitter));
        }
    }

    #[test]
    fn immediate_never_sleeps() {
        let p = RetryPolicy::immediate(50);
        assert_eq!(p.delay(1), Duration::ZERO);
        assert_eq!(p.delay(40), Duration::ZERO);
    }
}
