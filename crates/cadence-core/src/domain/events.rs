//! Events - ドメインイベント
//!
//! Metric-shaped facts emitted by the loops. Emission goes through the
//! `EventSink` port; the monitoring backend is outside this crate.

use std::time::Duration;

use super::ids::JobId;
use super::job_type::JobType;

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// Scheduler claimed a due job. `latency` = claim time - next_run_at.
    JobClaimed {
        job_id: JobId,
        job_type: JobType,
        latency: Duration,
    },

    JobQueued {
        job_id: JobId,
        job_type: JobType,
    },

    /// Worker started an attempt. `latency` = start time - occurrence time.
    JobStarted {
        job_id: JobId,
        job_type: JobType,
        attempt: u32,
        latency: Duration,
    },

    JobSucceeded {
        job_id: JobId,
        job_type: JobType,
        attempt: u32,
        duration: Duration,
    },

    JobFailed {
        job_id: JobId,
        job_type: JobType,
        attempt: u32,
        duration: Duration,
        will_retry: bool,
    },

    JobDeadLettered {
        job_id: JobId,
        job_type: JobType,
        attempts: u32,
    },

    /// Crash recovery returned jobs with expired leases to `Pending`.
    LeasesReclaimed { count: usize },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::JobClaimed { .. } => "job_claimed",
            DomainEvent::JobQueued { .. } => "job_queued",
            DomainEvent::JobStarted { .. } => "job_started",
            DomainEvent::JobSucceeded { .. } => "job_succeeded",
            DomainEvent::JobFailed { .. } => "job_failed",
            DomainEvent::JobDeadLettered { .. } => "job_dead_lettered",
            DomainEvent::LeasesReclaimed { .. } => "leases_reclaimed",
        }
    }

    pub fn job_id(&self) -> Option<JobId> {
        match self {
            DomainEvent::JobClaimed { job_id, .. }
            | DomainEvent::JobQueued { job_id, .. }
            | DomainEvent::JobStarted { job_id, .. }
            | DomainEvent::JobSucceeded { job_id, .. }
            | DomainEvent::JobFailed { job_id, .. }
            | DomainEvent::JobDeadLettered { job_id, .. } => Some(*job_id),
            DomainEvent::LeasesReclaimed { .. } => None,
        }
    }
}
