//! Reconnection retry policy with exponential backoff and jitter.
//!
//! The delay computation is a pure function of the attempt number so it can
//! be tested without timers: `delay(attempt) = min(initial * 2^attempt, max)`
//! plus a uniformly drawn jitter of 10-20% of that value. The jitter
//! desynchronizes reconnection storms when many dashboard clients lose the
//! same backend at once.

use std::time::Duration;

use crate::error::{StreamError, StreamResult};

/// Retry policy for supervised reconnection.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of automatic connection attempts before the client
    /// parks in a terminal error state.
    pub max_retries: u32,
    /// Delay before the first retry (doubles each attempt).
    pub initial_delay: Duration,
    /// Upper bound on the pre-jitter delay.
    pub max_delay: Duration,
    /// Lower jitter bound as a fraction of the capped delay.
    pub jitter_min: f64,
    /// Upper jitter bound as a fraction of the capped delay.
    pub jitter_max: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter_min: 0.10,
            jitter_max: 0.20,
        }
    }
}

impl RetryPolicy {
    /// Create a retry policy with the default dashboard settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy for links that should come back fast (local development).
    pub fn aggressive() -> Self {
        Self {
            max_retries: 20,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Policy for links where hammering the backend is worse than waiting.
    pub fn conservative() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Whether the given attempt count has used up the retry budget.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_retries
    }

    /// Delay before retrying the given attempt, jitter included.
    ///
    /// `attempt` starts at 0; the result is always within
    /// `[capped, capped * (1 + jitter_max)]` where
    /// `capped = min(initial * 2^attempt, max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, fastrand::f64())
    }

    /// Deterministic variant of [`RetryPolicy::delay`].
    ///
    /// `unit` in `[0, 1]` selects the jitter point between `jitter_min` and
    /// `jitter_max`; split out so the backoff curve can be pinned in tests.
    pub fn delay_with(&self, attempt: u32, unit: f64) -> Duration {
        let capped = self.base_delay(attempt);
        let jitter =
            self.jitter_min + (self.jitter_max - self.jitter_min) * unit.clamp(0.0, 1.0);
        Duration::from_millis((capped * (1.0 + jitter)) as u64)
    }

    /// Pre-jitter delay in milliseconds: `min(initial * 2^attempt, max)`.
    fn base_delay(&self, attempt: u32) -> f64 {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX).min(63);
        let doubled = self.initial_delay.as_millis() as f64 * 2f64.powi(exponent);
        doubled.min(self.max_delay.as_millis() as f64)
    }

    /// Check the policy for internally inconsistent values.
    pub fn validate(&self) -> StreamResult<()> {
        if self.initial_delay > self.max_delay {
            return Err(StreamError::Configuration(format!(
                "initial retry delay {:?} exceeds max delay {:?}",
                self.initial_delay, self.max_delay
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_min)
            || !(0.0..=1.0).contains(&self.jitter_max)
            || self.jitter_min > self.jitter_max
        {
            return Err(StreamError::Configuration(format!(
                "jitter bounds [{}, {}] must satisfy 0 <= min <= max <= 1",
                self.jitter_min, self.jitter_max
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 10);
        assert_eq!(policy.initial_delay, Duration::from_millis(1000));
        assert_eq!(policy.max_delay, Duration::from_millis(30_000));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy::default();

        // Pinned at zero jitter offset the curve is exactly 1.1x the base.
        assert_eq!(policy.delay_with(0, 0.0), Duration::from_millis(1100));
        assert_eq!(policy.delay_with(1, 0.0), Duration::from_millis(2200));
        assert_eq!(policy.delay_with(2, 0.0), Duration::from_millis(4400));

        // At the top of the jitter band it is exactly 1.2x.
        assert_eq!(policy.delay_with(0, 1.0), Duration::from_millis(1200));
        assert_eq!(policy.delay_with(2, 1.0), Duration::from_millis(4800));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let policy = RetryPolicy::default();

        // 2^10 * 1000ms would be ~17 minutes; the cap holds it at 30s + jitter.
        let delay = policy.delay_with(10, 1.0);
        assert_eq!(delay, Duration::from_millis(36_000));

        // Huge attempt numbers must not overflow.
        let delay = policy.delay_with(u32::MAX, 0.5);
        assert!(delay <= Duration::from_millis(36_000));
    }

    #[test]
    fn test_random_delay_stays_in_band() {
        let policy = RetryPolicy::default();

        for attempt in 0..5 {
            let base = 1000u64 * 2u64.pow(attempt);
            let floor = Duration::from_millis(base);
            let ceiling = Duration::from_millis(base + base / 5);
            for _ in 0..200 {
                let delay = policy.delay(attempt);
                assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
                assert!(delay <= ceiling, "attempt {attempt}: {delay:?} > {ceiling:?}");
            }
        }
    }

    #[test]
    fn test_delay_non_decreasing() {
        let policy = RetryPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 0..20 {
            let delay = policy.delay_with(attempt, 0.5);
            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn test_exhaustion() {
        let policy = RetryPolicy::default().with_max_retries(2);
        assert!(!policy.is_exhausted(0));
        assert!(!policy.is_exhausted(1));
        assert!(policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let policy = RetryPolicy::default()
            .with_initial_delay(Duration::from_secs(60))
            .with_max_delay(Duration::from_secs(30));
        assert!(policy.validate().is_err());

        let mut policy = RetryPolicy::default();
        policy.jitter_min = 0.5;
        policy.jitter_max = 0.1;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_presets() {
        assert_eq!(RetryPolicy::aggressive().max_retries, 20);
        assert_eq!(
            RetryPolicy::conservative().initial_delay,
            Duration::from_secs(2)
        );
        assert!(RetryPolicy::aggressive().validate().is_ok());
        assert!(RetryPolicy::conservative().validate().is_ok());
    }
}
