//! Decision model: what happens to a job after an attempt finishes.
//!
//! The Decider is a pure function of `(job snapshot, handler result, policy,
//! now)`. The worker computes the decision and the store applies it under the
//! version check, so a decision made from a stale snapshot is rejected
//! rather than applied.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;

use super::errors::HandlerError;
use super::job::Job;
use super::outcome::HandlerResult;
use super::retry::RetryPolicies;

/// The next action to take for a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// One-time job succeeded (or a recurring schedule is exhausted).
    Complete,

    /// Recurring job succeeded; start the next occurrence.
    Reschedule { next_run_at: DateTime<Utc> },

    /// Attempt failed with budget left.
    Retry {
        delay: Duration,
        run_at: DateTime<Utc>,
        reason: String,
    },

    /// Attempt budget exhausted.
    DeadLetter { reason: String },

    /// Handler reported a permanent failure.
    Fail { reason: String },
}

/// Decides the next action from an attempt's result.
pub trait Decider: Send + Sync {
    fn decide(&self, job: &Job, result: &HandlerResult, now: DateTime<Utc>) -> Decision;
}

/// Default decider: per-type retry policies, exponential backoff with jitter.
#[derive(Debug, Clone, Default)]
pub struct DefaultDecider {
    policies: RetryPolicies,
}

impl DefaultDecider {
    pub fn new(policies: RetryPolicies) -> Self {
        Self { policies }
    }

    pub fn policies(&self) -> &RetryPolicies {
        &self.policies
    }

    /// Same as [`Decider::decide`] with an explicit random source.
    pub fn decide_with<R: Rng>(
        &self,
        job: &Job,
        result: &HandlerResult,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Decision {
        let error = match result {
            Ok(()) => {
                if !job.is_recurring() {
                    return Decision::Complete;
                }
                return match job.schedule.next_after(now) {
                    Some(next_run_at) => Decision::Reschedule { next_run_at },
                    None => Decision::Complete,
                };
            }
            Err(error) => error,
        };

        if let HandlerError::Permanent(reason) = error {
            return Decision::Fail {
                reason: reason.clone(),
            };
        }

        let policy = self.policies.for_type(&job.job_type);
        let retry = policy.next_retry(job.attempt_count, job.max_attempts, rng);
        if retry.is_terminal {
            Decision::DeadLetter {
                reason: format!(
                    "max attempts reached: {}/{} ({error})",
                    job.attempt_count, job.max_attempts
                ),
            }
        } else {
            Decision::Retry {
                delay: retry.delay,
                run_at: add_duration(now, retry.delay),
                reason: format!(
                    "retry {}/{} after {:?}: {error}",
                    job.attempt_count + 1,
                    job.max_attempts,
                    retry.delay
                ),
            }
        }
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, job: &Job, result: &HandlerResult, now: DateTime<Utc>) -> Decision {
        self.decide_with(job, result, now, &mut rand::thread_rng())
    }
}

/// `t + d`, saturating at the far future.
pub fn add_duration(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(d)
        .ok()
        .and_then(|delta| t.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
