use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use super::config::RetryPolicy;

/// Retry state of one synchronization cycle.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    /// Failed attempts so far.
    failures: u32,
    next_eligible: Option<Instant>,
}

impl Backoff {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            next_eligible: None,
        }
    }

    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Earliest instant the next attempt may start.
    #[must_use]
    pub fn next_eligible(&self) -> Option<Instant> {
        self.next_eligible
    }

    /// Record a failed attempt.
    ///
    /// Returns the delay before the next attempt, or `None` once the retry
    /// budget is spent.
    pub fn on_failure(&mut self, now: Instant) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.failures > self.policy.max_retries() {
            self.next_eligible = None;
            return None;
        }

        let delay = delay_for(&self.policy, self.failures - 1);
        self.next_eligible = Some(now + delay);
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.next_eligible = None;
    }
}

/// Delay before retry number `retry` (zero based).
#[must_use]
pub fn delay_for(policy: &RetryPolicy, retry: u32) -> Duration {
    match *policy {
        RetryPolicy::Fixed { interval_ms, .. } => Duration::from_millis(interval_ms),
        RetryPolicy::Exponential {
            initial_delay_ms,
            max_delay_ms,
            factor,
            jitter,
            ..
        } => {
            let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
            let base = (initial_delay_ms as f64) * factor.powi(exponent);
            let extra = if jitter > 0.0 {
                base * rand::thread_rng().gen_range(0.0..=jitter)
            } else {
                0.0
            };
            let millis = (base + extra).min(max_delay_ms as f64);
            Duration::from_millis(millis as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exponential(jitter: f64) -> RetryPolicy {
        RetryPolicy::Exponential {
            max_retries: 4,
            initial_delay_ms: 100,
            max_delay_ms: 500,
            factor: 2.0,
            jitter,
        }
    }

    #[test]
    fn fixed_policy_waits_the_same_interval() {
        let mut backoff = Backoff::new(RetryPolicy::Fixed {
            retry_count: 2,
            interval_ms: 250,
        });
        let now = Instant::now();

        assert_eq!(backoff.on_failure(now), Some(Duration::from_millis(250)));
        assert_eq!(backoff.next_eligible(), Some(now + Duration::from_millis(250)));
        assert_eq!(backoff.on_failure(now), Some(Duration::from_millis(250)));
        assert_eq!(backoff.on_failure(now), None);
        assert_eq!(backoff.failures(), 3);
        assert_eq!(backoff.next_eligible(), None);
    }

    #[test]
    fn exponential_policy_grows_and_caps() {
        let policy = exponential(0.0);
        let delays: Vec<u64> = (0..4)
            .map(|retry| delay_for(&policy, retry).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 500]);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = exponential(0.5);
        for _ in 0..50 {
            let delay = delay_for(&policy, 1).as_millis();
            assert!((200..=300).contains(&delay), "delay {delay}");
        }
    }

    #[test]
    fn reset_restores_budget() {
        let mut backoff = Backoff::new(RetryPolicy::Fixed {
            retry_count: 0,
            interval_ms: 10,
        });
        assert_eq!(backoff.on_failure(Instant::now()), None);
        backoff.reset();
        assert_eq!(backoff.failures(), 0);
    }
}
