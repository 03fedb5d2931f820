//! Reconnect pacing for a shard fleet.
//!
//! When the gateway drops a whole fleet at once, every shard wants its
//! socket back at the same instant. Delays here double per failed
//! attempt and are then jittered downward by a random fraction, so
//! retries spread out instead of stampeding, the same way the first
//! heartbeat of a fresh connection is jittered.

use std::time::Duration;

/// Pacing for a shard's reconnection attempts.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay after the first failed connect; doubles per consecutive
    /// failure.
    pub base_delay: Duration,
    /// Ceiling the doubling never exceeds.
    pub max_delay: Duration,
    /// Fraction of the delay that may be randomly shaved off, so shards
    /// that failed together retry apart. `0.0` disables jitter.
    pub jitter: f64,
    /// Consecutive failed connects before the shard is marked dead
    /// (`None` keeps trying).
    pub give_up_after: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: 0.25,
            give_up_after: None,
        }
    }
}

impl ReconnectConfig {
    /// The jittered delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Duration {
        // Doublings are capped well before the shift could overflow;
        // max_delay bounds the result anyway.
        let doublings = attempt.saturating_sub(1).min(16);
        let stretched = self
            .base_delay
            .saturating_mul(1 << doublings)
            .min(self.max_delay);

        if self.jitter <= 0.0 {
            return stretched;
        }
        // Shave off up to `jitter` of the delay. Jitter pulls early
        // rather than late so the cap still bounds the worst case.
        let keep = 1.0 - self.jitter.min(1.0) * rand::random::<f64>();
        stretched.mul_f64(keep)
    }

    /// Whether the shard should stop retrying after `attempt`
    /// consecutive failures.
    #[must_use]
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.give_up_after.is_some_and(|limit| attempt >= limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> ReconnectConfig {
        ReconnectConfig {
            jitter: 0.0,
            ..ReconnectConfig::default()
        }
    }

    #[test]
    fn test_delay_doubles_per_failure() {
        let config = no_jitter();
        assert_eq!(config.next_delay(1), Duration::from_secs(1));
        assert_eq!(config.next_delay(2), Duration::from_secs(2));
        assert_eq!(config.next_delay(3), Duration::from_secs(4));
        assert_eq!(config.next_delay(6), Duration::from_secs(32));
    }

    #[test]
    fn test_delay_is_capped() {
        let config = no_jitter();
        assert_eq!(config.next_delay(7), Duration::from_secs(60));
        // Far past the cap the shift saturates instead of overflowing.
        assert_eq!(config.next_delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_attempt_behaves_like_first() {
        let config = no_jitter();
        assert_eq!(config.next_delay(0), config.next_delay(1));
    }

    #[test]
    fn test_jitter_only_shortens() {
        let config = ReconnectConfig {
            base_delay: Duration::from_secs(8),
            max_delay: Duration::from_secs(60),
            jitter: 0.5,
            give_up_after: None,
        };

        for _ in 0..100 {
            let delay = config.next_delay(1);
            assert!(delay <= Duration::from_secs(8));
            assert!(delay >= Duration::from_secs(4));
        }
    }

    #[test]
    fn test_jittered_delays_spread_out() {
        let config = ReconnectConfig {
            base_delay: Duration::from_secs(60),
            jitter: 0.9,
            ..ReconnectConfig::default()
        };

        let delays: Vec<Duration> = (0..32).map(|_| config.next_delay(1)).collect();
        let all_equal = delays.windows(2).all(|pair| pair[0] == pair[1]);
        assert!(!all_equal, "jitter produced identical delays");
    }

    #[test]
    fn test_exhaustion() {
        let forever = ReconnectConfig::default();
        assert!(!forever.is_exhausted(10_000));

        let bounded = ReconnectConfig {
            give_up_after: Some(3),
            ..ReconnectConfig::default()
        };
        assert!(!bounded.is_exhausted(2));
        assert!(bounded.is_exhausted(3));
        assert!(bounded.is_exhausted(4));
    }
}
