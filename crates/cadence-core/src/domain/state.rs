//! Job state machine.
//!
//! State transitions:
//! - Pending -> Claimed -> Queued -> Running -> Succeeded (one-time job)
//! - Running -> Pending (recurring job succeeded; next occurrence scheduled)
//! - Running -> Retrying -> Pending (loop until max_attempts)
//! - Running -> DeadLettered (attempt budget exhausted)
//! - Running -> Failed (handler reported a permanent failure)
//! - Claimed | Queued | Running -> Pending (lease expired, crash recovery)
//! - Claimed -> Pending (enqueue failed synchronously)
//! - Pending | Claimed | Queued | Retrying -> Cancelled (external request)
//! - DeadLettered | Failed -> Pending (operator replay)
//!
//! Every store backend consults [`JobStatus::can_transition_to`] before
//! committing a write.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for `next_run_at`.
    Pending,

    /// Picked by a scheduler instance, not yet handed to the queue.
    Claimed,

    /// Sitting in the task queue.
    Queued,

    /// A worker is executing the handler.
    Running,

    /// One-time job finished.
    Succeeded,

    /// Handler reported a permanent failure.
    Failed,

    /// Waiting out a backoff delay before the next attempt.
    Retrying,

    /// Attempt budget exhausted. Needs an operator.
    DeadLettered,

    /// Logically deleted.
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 9] = [
        JobStatus::Pending,
        JobStatus::Claimed,
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Succeeded,
        JobStatus::Failed,
        JobStatus::Retrying,
        JobStatus::DeadLettered,
        JobStatus::Cancelled,
    ];

    /// Terminal for the current occurrence (no automatic transition leaves it).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::DeadLettered | JobStatus::Cancelled
        )
    }

    /// States in which some instance holds the job's lease.
    pub fn is_leased(self) -> bool {
        matches!(self, JobStatus::Claimed | JobStatus::Queued | JobStatus::Running)
    }

    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            JobStatus::Pending | JobStatus::Claimed | JobStatus::Queued | JobStatus::Retrying
        )
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;

        match (self, next) {
            (Pending, Claimed) => true,
            (Claimed, Queued) | (Claimed, Pending) => true,
            (Queued, Running) | (Queued, Pending) => true,
            (Running, Succeeded | Pending | Retrying | DeadLettered | Failed) => true,
            (Retrying, Pending) => true,
            (DeadLettered | Failed, Pending) => true,
            (from, Cancelled) => from.is_cancellable(),
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Claimed => "claimed",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
            JobStatus::DeadLettered => "dead_lettered",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}
