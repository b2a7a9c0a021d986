//! Transport-level retry with exponential backoff.
//!
//! [`BackoffConfig`] controls how transient HTTP errors from the model
//! service are retried. [`BackoffConfig::gemini()`] is the policy every
//! production stage runs with; [`BackoffConfig::none()`] is for tests and the
//! mock backend.

use std::time::Duration;

/// Configuration for transport-level retry with exponential backoff.
///
/// # Example
///
/// ```
/// use leftover_chef::backend::BackoffConfig;
///
/// let none = BackoffConfig::none();
/// assert_eq!(none.max_retries, 0);
///
/// // Five attempts in total: the first call plus four retries.
/// let gemini = BackoffConfig::gemini();
/// assert_eq!(gemini.max_retries, 4);
/// ```
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after each retry.
    /// Delay grows: initial, initial * multiplier, initial * multiplier^2, ...
    pub multiplier: f64,

    /// Upper bound on a single delay.
    pub max_delay: Duration,

    /// Jitter strategy.
    pub jitter: JitterStrategy,

    /// HTTP status codes that trigger a retry.
    pub retryable_statuses: Vec<u16>,

    /// Whether a `Retry-After` header overrides the computed delay.
    pub respect_retry_after: bool,
}

/// Jitter applied on top of the computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// Delay is exactly the calculated value.
    None,

    /// Random value in `[0, calculated_delay]`.
    Full,

    /// `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
}

impl BackoffConfig {
    /// No transport retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::gemini()
        }
    }

    /// Retry policy for the Gemini API: 5 attempts, 1s initial delay,
    /// exponential base 7, retried on 429/500/503/504.
    pub fn gemini() -> Self {
        Self {
            max_retries: 4,
            initial_delay: Duration::from_secs(1),
            multiplier: 7.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::None,
            retryable_statuses: vec![429, 500, 503, 504],
            respect_retry_after: true,
        }
    }

    /// Build a policy from a total attempt count (first call included).
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.max_retries = attempts.saturating_sub(1);
        self
    }

    /// Calculate the delay for retry N (0-indexed).
    ///
    /// The base delay is `initial_delay * multiplier^attempt`, capped at
    /// `max_delay`. Jitter is then applied according to the configured strategy.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };

        Duration::from_secs_f64(jittered)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::gemini()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_delays_grow_by_seven() {
        let config = BackoffConfig::gemini();
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(7));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(49));
        // 343s uncapped
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(60));
    }

    #[test]
    fn test_gemini_preset() {
        let config = BackoffConfig::gemini();
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.retryable_statuses, vec![429, 500, 503, 504]);
        assert!(config.respect_retry_after);
    }

    #[test]
    fn test_with_attempts() {
        assert_eq!(BackoffConfig::gemini().with_attempts(3).max_retries, 2);
        assert_eq!(BackoffConfig::gemini().with_attempts(0).max_retries, 0);
    }

    #[test]
    fn test_jitter_full_in_range() {
        let config = BackoffConfig {
            jitter: JitterStrategy::Full,
            ..BackoffConfig::gemini()
        };
        for _ in 0..100 {
            assert!(config.delay_for_attempt(0) <= Duration::from_secs(1));
            assert!(config.delay_for_attempt(1) <= Duration::from_secs(7));
        }
    }

    #[test]
    fn test_jitter_equal_lower_bound() {
        let config = BackoffConfig {
            jitter: JitterStrategy::Equal,
            ..BackoffConfig::gemini()
        };
        for _ in 0..100 {
            let d = config.delay_for_attempt(1);
            assert!(d >= Duration::from_secs_f64(3.5) && d <= Duration::from_secs(7));
        }
    }

    #[test]
    fn test_none_preset() {
        assert_eq!(BackoffConfig::none().max_retries, 0);
    }
}
