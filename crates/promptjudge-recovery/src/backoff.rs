use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capped exponential backoff with additive jitter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub base: Duration,
    /// Hard ceiling for any single delay
    pub ceiling: Duration,
    /// Upper bound of the random extra delay, as a fraction of the delay
    pub jitter_ratio: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            ceiling: Duration::from_secs(30),
            jitter_ratio: 0.1,
        }
    }
}

impl BackoffPolicy {
    /// Delay without jitter after `failures` consecutive failures (1-based).
    pub fn base_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base
            .saturating_mul(1u32 << exponent)
            .min(self.ceiling)
    }

    /// Jittered delay, honouring a server retry hint when it asks for longer.
    pub fn delay(&self, failures: u32, retry_after: Option<Duration>) -> Duration {
        let mut delay = self.base_delay(failures);
        if let Some(hint) = retry_after {
            delay = delay.max(hint.min(self.ceiling));
        }

        let jitter_ms = (delay.as_millis() as f64 * self.jitter_ratio.max(0.0)) as u64;
        if jitter_ms == 0 {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0..=jitter_ms);
        (delay + Duration::from_millis(extra)).min(self.ceiling + Duration::from_millis(jitter_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_delay_doubles_until_ceiling() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(100),
            ceiling: Duration::from_millis(500),
            jitter_ratio: 0.0,
        };
        assert_eq!(policy.base_delay(1), Duration::from_millis(100));
        assert_eq!(policy.base_delay(2), Duration::from_millis(200));
        assert_eq!(policy.base_delay(3), Duration::from_millis(400));
        assert_eq!(policy.base_delay(4), Duration::from_millis(500));
        assert_eq!(policy.base_delay(30), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_ratio() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(1000),
            ceiling: Duration::from_secs(10),
            jitter_ratio: 0.1,
        };
        for _ in 0..50 {
            let d = policy.delay(1, None);
            assert!(d >= Duration::from_millis(1000));
            assert!(d <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn test_retry_after_is_capped() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(100),
            ceiling: Duration::from_secs(2),
            jitter_ratio: 0.0,
        };
        assert_eq!(
            policy.delay(1, Some(Duration::from_secs(60))),
            Duration::from_secs(2)
        );
        assert_eq!(
            policy.delay(1, Some(Duration::from_millis(700))),
            Duration::from_millis(700)
        );
    }
}
