//! Retry pacing: exponential backoff with additive jitter.

use std::time::Duration;

/// Maximum random jitter added to every computed delay.
pub const JITTER_MS: u64 = 500;

/// Backoff schedule for retrying failed source calls.
///
/// The deterministic part of the delay is `base * 2^attempt`, capped at
/// `max`; jitter in `[0, 500ms)` is added on top so concurrent clients do
/// not retry in lockstep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        let scaled = self
            .base
            .saturating_mul(2_u32.saturating_pow(attempt))
            .min(self.max);

        if self.jitter {
            scaled + Duration::from_millis(fastrand::u64(0..JITTER_MS))
        } else {
            scaled
        }
    }
}

/// Retry budget applied per source, per relay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Retries after the initial attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            backoff: Backoff {
                jitter: false,
                ..Backoff::default()
            },
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_schedule_without_jitter() {
        let backoff = Backoff {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_secs(1)); // capped
        assert_eq!(backoff.delay(10), Duration::from_secs(1));
    }

    #[test]
    fn jittered_delay_stays_within_half_second_of_schedule() {
        let backoff = Backoff {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
            jitter: true,
        };

        for _ in 0..50 {
            for attempt in 0..6 {
                let expected = Duration::from_millis(100)
                    .saturating_mul(2_u32.pow(attempt))
                    .min(Duration::from_secs(1));
                let delay = backoff.delay(attempt);

                assert!(delay >= expected, "jitter must never shorten the delay");
                assert!(delay < expected + Duration::from_millis(JITTER_MS));
            }
        }
    }

    #[test]
    fn schedule_is_monotone_up_to_the_cap() {
        let backoff = Backoff {
            base: Duration::from_millis(250),
            max: Duration::from_secs(4),
            jitter: false,
        };

        let mut previous = Duration::ZERO;
        for attempt in 0..8 {
            let delay = backoff.delay(attempt);
            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn no_retry_config_has_zero_budget() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_retries, 0);
    }
}
