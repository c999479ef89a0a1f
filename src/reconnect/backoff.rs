//! Exponential backoff for persistent-connection reconnects

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectConfig;

/// `delay(attempt) = min(base * 2^attempt, cap)`, optionally jittered
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay for attempt 0, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound for any delay, in milliseconds
    pub max_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000, // 30 seconds
            jitter_factor: 0.0,
        }
    }
}

impl From<&ReconnectConfig> for BackoffPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            jitter_factor: config.jitter_factor.clamp(0.0, 1.0),
        }
    }
}

impl BackoffPolicy {
    /// Deterministic part of the delay for the given attempt
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        // 2^attempt overflows u64 past 63; anything that large is capped anyway
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    /// Delay for the given attempt with jitter applied, never above the cap
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for(attempt).as_millis() as f64;

        let final_delay = if self.jitter_factor > 0.0 && base > 0.0 {
            let jitter_range = base * self.jitter_factor;
            let jitter = rand::rng().random_range(-jitter_range..jitter_range);
            (base + jitter).clamp(1.0, self.max_delay_ms as f64)
        } else {
            base
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Attempt counter around a [`BackoffPolicy`]
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with default configuration
    pub fn new() -> Self {
        Self::with_policy(BackoffPolicy::default())
    }

    pub fn with_policy(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay for the current attempt; advances the counter
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Reset the backoff to initial state
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Get the current attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_from_base() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(16_000));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(5), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(20), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(200), Duration::from_millis(30_000));
    }

    #[test]
    fn test_jitter_stays_within_cap() {
        let policy = BackoffPolicy {
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            jitter_factor: 0.5,
        };
        for attempt in 0..10 {
            let delay = policy.delay_for(attempt);
            assert!(delay.as_millis() <= 5000);
            assert!(delay.as_millis() >= 1);
        }
    }

    #[test]
    fn test_exponential_backoff_sequence_and_reset() {
        let mut backoff = ExponentialBackoff::new();

        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(4000));
        assert_eq!(backoff.attempt(), 3);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn test_policy_from_config_clamps_jitter() {
        let config = ReconnectConfig {
            base_delay_ms: 250,
            max_delay_ms: 4000,
            jitter_factor: 3.0,
            max_attempts: None,
        };
        let policy = BackoffPolicy::from(&config);
        assert_eq!(policy.base_delay_ms, 250);
        assert_eq!(policy.jitter_factor, 1.0);
    }
}
