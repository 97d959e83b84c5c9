//! Reconnect backoff.
//!
//! The delay before reconnect attempt `n` (0-indexed) is
//! `first × factor^n`, clamped to `max`. With `jitter` enabled the delay is
//! drawn from `[delay/2, delay]` so that many clients dropped by the same
//! outage do not reconnect in lockstep. The base delay is derived from the
//! attempt number alone; jitter never feeds back into later attempts.

use std::time::Duration;

use rand::Rng;

/// Reconnection policy for [`SubscriptionManager`](super::SubscriptionManager).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt.
    pub first: Duration,
    /// Maximum delay between attempts.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0`).
    pub factor: f64,
    /// Apply equal jitter to every delay.
    pub jitter: bool,
    /// Consecutive failed attempts after which the manager gives up.
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: true,
            max_attempts: Some(12),
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait before reconnect attempt `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };

        if !self.jitter || base.is_zero() {
            return base;
        }
        let half = base / 2;
        let spread = base.saturating_sub(half).as_nanos().min(u64::MAX as u128) as u64;
        half + Duration::from_nanos(rand::rng().random_range(0..=spread))
    }

    /// `true` once `failed` consecutive attempts exhaust the policy.
    pub fn exhausted(&self, failed: u32) -> bool {
        self.max_attempts.is_some_and(|max| failed >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(5),
            factor: 2.0,
            jitter: false,
            max_attempts: Some(3),
        }
    }

    #[test]
    fn test_exponential_growth_is_capped() {
        let p = policy();
        assert_eq!(p.delay(0), Duration::from_millis(100));
        assert_eq!(p.delay(1), Duration::from_millis(200));
        assert_eq!(p.delay(3), Duration::from_millis(800));
        assert_eq!(p.delay(10), Duration::from_secs(5));
        assert_eq!(p.delay(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_half_to_full() {
        let p = ReconnectPolicy {
            jitter: true,
            ..policy()
        };
        for attempt in 0..8 {
            let base = ReconnectPolicy { jitter: false, ..p }.delay(attempt);
            let d = p.delay(attempt);
            assert!(d >= base / 2 && d <= base, "{d:?} not in [{:?}, {base:?}]", base / 2);
        }
    }

    #[test]
    fn test_exhaustion() {
        let p = policy();
        assert!(!p.exhausted(2));
        assert!(p.exhausted(3));

        let forever = ReconnectPolicy {
            max_attempts: None,
            ..p
        };
        assert!(!forever.exhausted(u32::MAX));
    }
}
