//! Shared retry policy.
//!
//! One policy object is consumed by two very different call sites: the
//! session's reconnect loop, and callers who choose to wrap a flaky recipe
//! execution themselves. The schedule is a flat list of `max_retries`
//! delays, each equal to `retry_delay` -- constant rather than exponential,
//! matching the declared configuration surface.
//!
//! The policy is never applied automatically around a recipe execution:
//! recipes may have side effects that must not be blindly repeated, so
//! retrying one is always the caller's decision.

use std::time::Duration;

use crate::config::ConnectionConfig;

/// A bounded, constant-delay retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryPolicy {
    /// Build a policy with an explicit bound and delay.
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// Build the policy declared by a connection configuration.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay)
    }

    /// The retry bound.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The full schedule: `max_retries` delays, each `retry_delay` long.
    pub fn delays(&self) -> Vec<Duration> {
        vec![self.retry_delay; self.max_retries as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_is_flat_and_bounded() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let delays = policy.delays();
        assert_eq!(delays.len(), 3);
        assert!(delays.iter().all(|d| *d == Duration::from_secs(1)));
    }

    #[test]
    fn test_zero_retries_yields_empty_schedule() {
        let policy = RetryPolicy::new(0, Duration::from_millis(250));
        assert!(policy.delays().is_empty());
    }

    #[test]
    fn test_from_config() {
        let config = ConnectionConfig {
            max_retries: 5,
            retry_delay: Duration::from_millis(200),
            ..Default::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_retries(), 5);
        assert_eq!(policy.delays(), vec![Duration::from_millis(200); 5]);
    }
}
