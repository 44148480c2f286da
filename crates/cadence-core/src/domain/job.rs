//! Job record: the durable row every component reads and writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{JobId, LeaseOwner};
use super::job_type::JobType;
use super::schedule::Schedule;
use super::state::JobStatus;

/// Snapshot of one job.
///
/// Design:
/// - The store owns the authoritative copy; callers only see clones.
/// - Every state-changing write bumps `version`. A write carrying a stale
///   `version` is rejected, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub schedule: Schedule,
    pub status: JobStatus,

    /// Next eligible execution. `None` when no future run exists.
    pub next_run_at: Option<DateTime<Utc>>,

    /// Scheduled instant of the current occurrence. Retries keep it; a
    /// recurring reschedule advances it.
    pub occurrence_at: Option<DateTime<Utc>>,

    /// Attempts made for the current occurrence.
    pub attempt_count: u32,
    pub max_attempts: u32,

    pub lease_owner: Option<LeaseOwner>,
    pub lease_expires_at: Option<DateTime<Utc>>,

    pub version: u64,

    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn is_recurring(&self) -> bool {
        self.schedule.is_recurring()
    }

    /// Someone holds a lease that has not yet expired at `now`.
    pub fn has_live_lease(&self, now: DateTime<Utc>) -> bool {
        match (&self.lease_owner, self.lease_expires_at) {
            (Some(_), Some(expires)) => expires >= now,
            _ => false,
        }
    }

    /// Eligible for `claim_due_jobs` at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending
            && self.next_run_at.is_some_and(|at| at <= now)
            && !self.has_live_lease(now)
    }

    /// Idempotency key for the current occurrence.
    pub fn dedup_key(&self) -> String {
        match self.occurrence_at {
            Some(at) => format!("{}@{}", self.id, at.to_rfc3339()),
            None => self.id.to_string(),
        }
    }

    pub(crate) fn set_lease(&mut self, owner: LeaseOwner, expires_at: DateTime<Utc>) {
        self.lease_owner = Some(owner);
        self.lease_expires_at = Some(expires_at);
    }

    pub(crate) fn clear_lease(&mut self) {
        self.lease_owner = None;
        self.lease_expires_at = None;
    }

    /// Apply a status change and bump the version.
    pub(crate) fn touch(&mut self, status: JobStatus, now: DateTime<Utc>) {
        self.status = status;
        self.version += 1;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ulid::Ulid;

    fn job(now: DateTime<Utc>) -> Job {
        Job {
            id: JobId::from_ulid(Ulid::new()),
            job_type: JobType::new("test.noop.v1"),
            payload: serde_json::json!({}),
            schedule: Schedule::once(now),
            status: JobStatus::Pending,
            next_run_at: Some(now),
            occurrence_at: Some(now),
            attempt_count: 0,
            max_attempts: 3,
            lease_owner: None,
            lease_expires_at: None,
            version: 1,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn due_requires_pending_and_elapsed_run_time() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut j = job(now);
        assert!(j.is_due(now));
        assert!(!j.is_due(now - Duration::seconds(1)));

        j.status = JobStatus::Retrying;
        assert!(!j.is_due(now));
    }

    #[test]
    fn live_lease_blocks_due() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut j = job(now);
        j.set_lease(LeaseOwner::new("scheduler-a"), now + Duration::seconds(30));
        assert!(!j.is_due(now));
        assert!(j.is_due(now + Duration::seconds(31)));
    }

    #[test]
    fn dedup_key_is_stable_per_occurrence() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut j = job(now);
        let first = j.dedup_key();
        j.touch(JobStatus::Claimed, now);
        assert_eq!(j.dedup_key(), first);

        j.occurrence_at = Some(now + Duration::minutes(10));
        assert_ne!(j.dedup_key(), first);
    }
}
