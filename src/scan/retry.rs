//! Retry policy applied by the worker pool

use crate::config::{BackoffKind, ScannerConfig};
use std::time::Duration;

/// Delay shape between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
    },
}

/// How many times a task is attempted and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Single attempt, no retry
    pub fn none() -> Self {
        Self::new(1, Backoff::Fixed(Duration::ZERO))
    }

    pub fn from_config(config: &ScannerConfig) -> Self {
        let base = Duration::from_millis(config.backoff_ms);
        let backoff = match config.backoff {
            BackoffKind::Fixed => Backoff::Fixed(base),
            BackoffKind::Exponential => Backoff::Exponential {
                base,
                factor: 2.0,
                max: Duration::from_millis(config.backoff_max_ms),
            },
        };
        Self::new(config.max_attempts, backoff)
    }

    /// True if another attempt may follow attempt number `attempt` (1-based)
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, factor, max } => {
                let exponent = attempt.saturating_sub(1) as i32;
                let scaled = base.as_secs_f64() * factor.powi(exponent);
                if !scaled.is_finite() || scaled >= max.as_secs_f64() {
                    max
                } else {
                    Duration::from_secs_f64(scaled)
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Backoff::Fixed(Duration::from_millis(200)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_backoff() {
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(200)));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = RetryPolicy::new(
            10,
            Backoff::Exponential {
                base: Duration::from_millis(100),
                factor: 2.0,
                max: Duration::from_millis(500),
            },
        );
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(60), Duration::from_millis(500));
    }

    #[test]
    fn test_should_retry_bound() {
        let policy = RetryPolicy::new(2, Backoff::Fixed(Duration::ZERO));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert!(!RetryPolicy::none().should_retry(1));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Backoff::Fixed(Duration::ZERO)).max_attempts, 1);
    }
}
