//! Retry policies for the supervisor's health probe and the live stream.
//!
//! A policy is plain data: given the 1-based attempt number it yields the
//! delay to wait before that attempt, or `None` once attempts run out.
//! Callers sleep on `tokio::time`, so paused-clock tests drive it
//! deterministically.

use std::time::Duration;

/// Delay shape between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every attempt.
    Fixed { delay: Duration },
    /// `initial * 2^(attempt-1)`, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Backoff,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Fixed delay, unbounded attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            backoff: Backoff::Fixed { delay },
            max_attempts: None,
        }
    }

    /// Doubling delay capped at `max`, unbounded attempts.
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            backoff: Backoff::Exponential { initial, max },
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Delay before retry `attempt` (1-based), or `None` when exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return Some(Duration::ZERO);
        }
        if self.max_attempts.is_some_and(|max| attempt > max) {
            return None;
        }
        Some(match self.backoff {
            Backoff::Fixed { delay } => delay,
            Backoff::Exponential { initial, max } => {
                let factor = 2_u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
                initial.saturating_mul(factor).min(max)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_is_constant_and_unbounded() {
        let policy = RetryPolicy::fixed(Duration::from_secs(10));
        for attempt in [1, 2, 3, 1_000] {
            assert_eq!(policy.delay_for(attempt), Some(Duration::from_secs(10)));
        }
    }

    #[test]
    fn exponential_doubles_then_caps() {
        let policy = RetryPolicy::exponential(Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(policy.delay_for(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for(5), Some(Duration::from_secs(16)));
        assert_eq!(policy.delay_for(6), Some(Duration::from_secs(30)));
        assert_eq!(policy.delay_for(64), Some(Duration::from_secs(30)));
    }

    #[test]
    fn max_attempts_exhausts() {
        let policy = RetryPolicy::fixed(Duration::from_secs(5)).with_max_attempts(2);
        assert!(policy.delay_for(2).is_some());
        assert_eq!(policy.delay_for(3), None);
    }
}
