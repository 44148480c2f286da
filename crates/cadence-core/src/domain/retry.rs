//! Retry policy: decides backoff delays and when to give up.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::job_type::JobType;

/// Retry policy for one class of jobs.
///
/// Exponential backoff capped at `max_delay`, plus optional jitter drawn from
/// `[0, delay/2]` so jobs that failed together do not retry together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "RetryPolicy::default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "RetryPolicy::default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Attempt ceiling for new jobs that do not specify their own.
    #[serde(default = "RetryPolicy::default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "RetryPolicy::default_jitter")]
    pub jitter: bool,
}

/// Result of [`RetryPolicy::next_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub delay: Duration,
    pub is_terminal: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: Self::default_base_delay_ms(),
            max_delay_ms: Self::default_max_delay_ms(),
            max_attempts: Self::default_max_attempts(),
            jitter: Self::default_jitter(),
        }
    }
}

impl RetryPolicy {
    fn default_base_delay_ms() -> u64 {
        1_000
    }

    fn default_max_delay_ms() -> u64 {
        60_000
    }

    fn default_max_attempts() -> u32 {
        3
    }

    fn default_jitter() -> bool {
        true
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Deterministic part of the delay.
    ///
    /// `attempt_count` is the number of attempts already made (1 after the
    /// first failure): `min(max_delay, base * 2^(attempt_count - 1))`.
    ///
    /// With base=1s: 1s, 2s, 4s, 8s ... up to max_delay.
    pub fn backoff(&self, attempt_count: u32) -> Duration {
        let exponent = attempt_count.saturating_sub(1).min(32);
        let millis = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    /// Next retry delay and whether the budget is exhausted.
    ///
    /// `is_terminal` is true iff `attempt_count >= max_attempts`. Apart from
    /// the jitter draw the result depends only on the inputs.
    pub fn next_retry<R: Rng>(
        &self,
        attempt_count: u32,
        max_attempts: u32,
        rng: &mut R,
    ) -> RetryDecision {
        let is_terminal = attempt_count >= max_attempts;
        let delay = self.backoff(attempt_count);
        let delay = if self.jitter && !delay.is_zero() {
            let half = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX);
            delay + Duration::from_millis(rng.gen_range(0..=half))
        } else {
            delay
        };
        RetryDecision { delay, is_terminal }
    }
}

/// Policies per job type, with a fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicies {
    #[serde(default)]
    pub default: RetryPolicy,

    #[serde(default)]
    pub job_types: HashMap<JobType, RetryPolicy>,
}

impl RetryPolicies {
    pub fn new(default: RetryPolicy) -> Self {
        Self {
            default,
            job_types: HashMap::new(),
        }
    }

    pub fn with_policy(mut self, job_type: impl Into<JobType>, policy: RetryPolicy) -> Self {
        self.job_types.insert(job_type.into(), policy);
        self
    }

    pub fn for_type(&self, job_type: &JobType) -> &RetryPolicy {
        self.job_types.get(job_type).unwrap_or(&self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rstest::rstest;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
            max_attempts: 5,
            jitter: false,
        }
    }

    #[test]
    fn default_policy_has_reasonable_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay(), Duration::from_secs(1));
        assert_eq!(policy.max_delay(), Duration::from_secs(60));
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.jitter);
    }

    #[rstest]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(3, 8)]
    #[case(4, 16)]
    #[case(5, 30)]
    #[case(40, 30)]
    fn exponential_backoff_is_capped(#[case] attempts: u32, #[case] secs: u64) {
        assert_eq!(no_jitter().backoff(attempts), Duration::from_secs(secs));
    }

    #[test]
    fn backoff_is_non_decreasing() {
        let policy = no_jitter();
        let mut prev = Duration::ZERO;
        for n in 0..64 {
            let d = policy.backoff(n);
            assert!(d >= prev, "backoff({n}) = {d:?} < {prev:?}");
            assert!(d <= policy.max_delay());
            prev = d;
        }
    }

    #[rstest]
    #[case(0, 3, false)]
    #[case(2, 3, false)]
    #[case(3, 3, true)]
    #[case(4, 3, true)]
    fn terminal_iff_budget_reached(
        #[case] attempts: u32,
        #[case] max: u32,
        #[case] terminal: bool,
    ) {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            no_jitter().next_retry(attempts, max, &mut rng).is_terminal,
            terminal
        );
    }

    #[test]
    fn jitter_stays_within_half_delay() {
        let policy = RetryPolicy {
            jitter: true,
            ..no_jitter()
        };
        let mut rng = StdRng::seed_from_u64(42);
        for n in 1..8 {
            let base = policy.backoff(n);
            let d = policy.next_retry(n, 10, &mut rng).delay;
            assert!(d >= base);
            assert!(d <= base + base / 2);
        }
    }

    #[test]
    fn per_type_policy_overrides_default() {
        let policies = RetryPolicies::default().with_policy("mail.send.v1", no_jitter());
        assert_eq!(
            policies.for_type(&JobType::new("mail.send.v1")).max_attempts,
            5
        );
        assert_eq!(policies.for_type(&JobType::new("other")).max_attempts, 3);
    }
}
