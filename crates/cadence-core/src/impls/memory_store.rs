//! In-memory JobStore implementation.
//!
//! The whole state sits behind one `tokio::sync::Mutex`, so every method is a
//! single linearised read-modify-write: the in-process analogue of a row lock
//! plus a conditional `UPDATE ... WHERE version = $v`. Share it between
//! simulated replicas with `Arc`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{
    AttemptRecord, CadenceError, Decision, Job, JobFilter, JobId, JobPatch, JobSpec, JobStatus,
    LeaseOwner, RetryPolicy, add_duration,
};
use crate::ports::{Clock, IdGenerator, JobStore, SystemClock, UlidGenerator};

#[derive(Default)]
struct StoreState {
    jobs: HashMap<JobId, Job>,
    attempts: HashMap<JobId, Vec<AttemptRecord>>,
}

impl StoreState {
    fn job_mut(&mut self, job_id: JobId) -> Result<&mut Job, CadenceError> {
        self.jobs
            .get_mut(&job_id)
            .ok_or(CadenceError::NotFound(job_id))
    }

    /// Version check first (stale writer), then the transition table.
    fn guarded_mut(
        &mut self,
        job_id: JobId,
        version: u64,
        to: JobStatus,
    ) -> Result<&mut Job, CadenceError> {
        let job = self.job_mut(job_id)?;
        check_version(job, version)?;
        check_transition(job, to)?;
        Ok(job)
    }
}

fn check_version(job: &Job, version: u64) -> Result<(), CadenceError> {
    if job.version != version {
        return Err(CadenceError::Conflict {
            job_id: job.id,
            expected: version,
            actual: job.version,
        });
    }
    Ok(())
}

fn check_transition(job: &Job, to: JobStatus) -> Result<(), CadenceError> {
    if !job.status.can_transition_to(to) {
        return Err(CadenceError::InvalidTransition {
            job_id: job.id,
            from: job.status,
            to,
        });
    }
    Ok(())
}

fn check_lease(job: &Job, now: DateTime<Utc>) -> Result<(), CadenceError> {
    match job.lease_expires_at {
        Some(expires) if expires < now => Err(CadenceError::LeaseExpired(job.id)),
        _ => Ok(()),
    }
}

fn validate_max_attempts(max_attempts: u32) -> Result<u32, CadenceError> {
    if max_attempts == 0 {
        return Err(CadenceError::Configuration(
            "max_attempts must be at least 1".to_string(),
        ));
    }
    Ok(max_attempts)
}

pub struct InMemoryJobStore {
    state: Arc<Mutex<StoreState>>,
    clock: Arc<dyn Clock>,
    ids: Box<dyn IdGenerator>,
}

impl InMemoryJobStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            clock,
            ids: Box::new(UlidGenerator::new(SystemClock)),
        }
    }

    pub fn with_id_generator(mut self, ids: Box<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        batch_size: usize,
        claimant: &LeaseOwner,
        lease_ttl: Duration,
    ) -> Result<Vec<Job>, CadenceError> {
        let mut state = self.state.lock().await;

        let mut due: Vec<(DateTime<Utc>, JobId)> = state
            .jobs
            .values()
            .filter(|job| job.is_due(now))
            .filter_map(|job| job.next_run_at.map(|at| (at, job.id)))
            .collect();
        due.sort();
        due.truncate(batch_size);

        let expires_at = add_duration(now, lease_ttl);
        let mut claimed = Vec::with_capacity(due.len());
        for (_, job_id) in due {
            let job = state.job_mut(job_id)?;
            job.set_lease(claimant.clone(), expires_at);
            job.touch(JobStatus::Claimed, now);
            claimed.push(job.clone());
        }

        if !claimed.is_empty() {
            debug!(claimant = %claimant, count = claimed.len(), "claimed due jobs");
        }
        Ok(claimed)
    }

    async fn mark_queued(&self, job_id: JobId, version: u64) -> Result<Job, CadenceError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let job = state.guarded_mut(job_id, version, JobStatus::Queued)?;
        check_lease(job, now)?;
        job.touch(JobStatus::Queued, now);
        Ok(job.clone())
    }

    async fn release_claim(&self, job_id: JobId, version: u64) -> Result<Job, CadenceError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let job = state.guarded_mut(job_id, version, JobStatus::Pending)?;
        if job.status != JobStatus::Claimed {
            return Err(CadenceError::InvalidTransition {
                job_id,
                from: job.status,
                to: JobStatus::Pending,
            });
        }
        job.clear_lease();
        job.touch(JobStatus::Pending, now);
        Ok(job.clone())
    }

    async fn mark_running(
        &self,
        job_id: JobId,
        version: u64,
        worker: &LeaseOwner,
        now: DateTime<Utc>,
        lease_ttl: Duration,
    ) -> Result<Job, CadenceError> {
        let mut state = self.state.lock().await;
        let job = state.guarded_mut(job_id, version, JobStatus::Running)?;
        check_lease(job, now)?;
        job.set_lease(worker.clone(), add_duration(now, lease_ttl));
        job.attempt_count += 1;
        job.touch(JobStatus::Running, now);
        Ok(job.clone())
    }

    async fn record_outcome(
        &self,
        job_id: JobId,
        version: u64,
        mut attempt: AttemptRecord,
        decision: Decision,
    ) -> Result<Job, CadenceError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let job = state.job_mut(job_id)?;
        check_version(job, version)?;
        if job.status != JobStatus::Running {
            return Err(CadenceError::InvalidTransition {
                job_id,
                from: job.status,
                to: decision_target(&decision),
            });
        }
        check_transition(job, decision_target(&decision))?;
        // no lease check: reclaim bumps the version, so a matching version
        // means the job is still this worker's even if the lease ran out

        attempt.job_id = job_id;
        attempt.attempt_number = job.attempt_count;

        job.clear_lease();
        match decision {
            Decision::Complete => {
                job.next_run_at = None;
                job.last_error = None;
                job.touch(JobStatus::Succeeded, now);
            }
            Decision::Reschedule { next_run_at } => {
                job.next_run_at = Some(next_run_at);
                job.occurrence_at = Some(next_run_at);
                job.attempt_count = 0;
                job.last_error = None;
                job.touch(JobStatus::Pending, now);
            }
            Decision::Retry { run_at, .. } => {
                job.next_run_at = Some(run_at);
                job.last_error = attempt.error_detail.clone();
                job.touch(JobStatus::Retrying, now);
            }
            Decision::DeadLetter { reason } => {
                job.next_run_at = None;
                job.last_error = Some(reason);
                job.touch(JobStatus::DeadLettered, now);
            }
            Decision::Fail { reason } => {
                job.next_run_at = None;
                job.last_error = Some(reason);
                job.touch(JobStatus::Failed, now);
            }
        }
        let job = job.clone();

        state.attempts.entry(job_id).or_default().push(attempt);
        Ok(job)
    }

    async fn reclaim_expired_leases(&self, now: DateTime<Utc>) -> Result<usize, CadenceError> {
        let mut state = self.state.lock().await;
        let StoreState { jobs, attempts } = &mut *state;

        let mut reclaimed = 0;
        for job in jobs.values_mut() {
            let expired = job.status.is_leased()
                && job.lease_expires_at.is_some_and(|expires| expires < now);
            if !expired {
                continue;
            }

            if job.status == JobStatus::Running {
                attempts
                    .entry(job.id)
                    .or_default()
                    .push(AttemptRecord::lease_expired(
                        job.id,
                        job.attempt_count,
                        job.updated_at,
                        now,
                    ));
                job.last_error = Some("lease expired".to_string());
            }

            debug!(job.id = %job.id, from = %job.status, "reclaiming expired lease");
            job.clear_lease();
            job.next_run_at = Some(now);
            job.touch(JobStatus::Pending, now);
            reclaimed += 1;
        }
        Ok(reclaimed)
    }

    async fn promote_due_retries(&self, now: DateTime<Utc>) -> Result<usize, CadenceError> {
        let mut state = self.state.lock().await;
        let mut promoted = 0;
        for job in state.jobs.values_mut() {
            if job.status == JobStatus::Retrying && job.next_run_at.is_some_and(|at| at <= now) {
                job.touch(JobStatus::Pending, now);
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    async fn create(&self, spec: JobSpec, now: DateTime<Utc>) -> Result<JobId, CadenceError> {
        spec.schedule.validate()?;
        let max_attempts = validate_max_attempts(
            spec.max_attempts
                .unwrap_or(RetryPolicy::default().max_attempts),
        )?;
        let next_run_at = spec
            .schedule
            .first_run(now)?
            .ok_or_else(|| CadenceError::InvalidSchedule("schedule never fires".to_string()))?;

        let id = self.ids.generate_job_id();
        let job = Job {
            id,
            job_type: spec.job_type,
            payload: spec.payload,
            schedule: spec.schedule,
            status: JobStatus::Pending,
            next_run_at: Some(next_run_at),
            occurrence_at: Some(next_run_at),
            attempt_count: 0,
            max_attempts,
            lease_owner: None,
            lease_expires_at: None,
            version: 1,
            last_error: None,
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.lock().await;
        state.jobs.insert(id, job);
        Ok(id)
    }

    async fn get(&self, job_id: JobId) -> Result<Job, CadenceError> {
        let state = self.state.lock().await;
        state
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(CadenceError::NotFound(job_id))
    }

    async fn update(
        &self,
        job_id: JobId,
        version: u64,
        patch: JobPatch,
        now: DateTime<Utc>,
    ) -> Result<Job, CadenceError> {
        if let Some(schedule) = &patch.schedule {
            schedule.validate()?;
        }
        let max_attempts = patch.max_attempts.map(validate_max_attempts).transpose()?;

        let mut state = self.state.lock().await;
        let job = state.job_mut(job_id)?;
        check_version(job, version)?;
        if job.status.is_leased() {
            return Err(CadenceError::InvalidTransition {
                job_id,
                from: job.status,
                to: job.status,
            });
        }
        if patch.is_empty() {
            return Ok(job.clone());
        }

        if let Some(payload) = patch.payload {
            job.payload = payload;
        }
        if let Some(max_attempts) = max_attempts {
            job.max_attempts = max_attempts;
        }
        if let Some(schedule) = patch.schedule {
            if job.status == JobStatus::Pending {
                let next = schedule.first_run(now)?.ok_or_else(|| {
                    CadenceError::InvalidSchedule("schedule never fires".to_string())
                })?;
                job.next_run_at = Some(next);
                job.occurrence_at = Some(next);
            }
            job.schedule = schedule;
        }
        let status = job.status;
        job.touch(status, now);
        Ok(job.clone())
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, CadenceError> {
        let state = self.state.lock().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    async fn cancel(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, CadenceError> {
        let mut state = self.state.lock().await;
        let job = state.job_mut(job_id)?;
        if job.status == JobStatus::Cancelled {
            return Ok(job.clone());
        }
        check_transition(job, JobStatus::Cancelled)?;
        job.clear_lease();
        job.next_run_at = None;
        job.touch(JobStatus::Cancelled, now);
        Ok(job.clone())
    }

    async fn replay(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, CadenceError> {
        let mut state = self.state.lock().await;
        let job = state.job_mut(job_id)?;
        if !matches!(job.status, JobStatus::DeadLettered | JobStatus::Failed) {
            return Err(CadenceError::InvalidTransition {
                job_id,
                from: job.status,
                to: JobStatus::Pending,
            });
        }
        job.attempt_count = 0;
        job.next_run_at = Some(now);
        job.occurrence_at = job.occurrence_at.or(Some(now));
        job.last_error = None;
        job.touch(JobStatus::Pending, now);
        Ok(job.clone())
    }

    async fn attempts(&self, job_id: JobId) -> Result<Vec<AttemptRecord>, CadenceError> {
        let state = self.state.lock().await;
        if !state.jobs.contains_key(&job_id) {
            return Err(CadenceError::NotFound(job_id));
        }
        let mut records = state.attempts.get(&job_id).cloned().unwrap_or_default();
        records.sort_by_key(|r| r.attempt_number);
        Ok(records)
    }
}

fn decision_target(decision: &Decision) -> JobStatus {
    match decision {
        Decision::Complete => JobStatus::Succeeded,
        Decision::Reschedule { .. } => JobStatus::Pending,
        Decision::Retry { .. } => JobStatus::Retrying,
        Decision::DeadLetter { .. } => JobStatus::DeadLettered,
        Decision::Fail { .. } => JobStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HandlerError, JobType, OutcomeKind, Schedule};
    use crate::ports::FixedClock;
    use chrono::TimeZone;
    use std::collections::HashSet;

    const TTL: Duration = Duration::from_secs(30);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn store() -> (Arc<InMemoryJobStore>, FixedClock) {
        let clock = FixedClock::new(t0());
        (
            Arc::new(InMemoryJobStore::new(Arc::new(clock.clone()))),
            clock,
        )
    }

    fn once_now() -> JobSpec {
        JobSpec::new("test.job.v1", Schedule::once(t0())).with_max_attempts(2)
    }

    fn owner(name: &str) -> LeaseOwner {
        LeaseOwner::new(name)
    }

    async fn running_job(store: &InMemoryJobStore) -> Job {
        let id = store.create(once_now(), t0()).await.unwrap();
        let claimed = store
            .claim_due_jobs(t0(), 10, &owner("scheduler-a"), TTL)
            .await
            .unwrap();
        let queued = store.mark_queued(id, claimed[0].version).await.unwrap();
        store
            .mark_running(id, queued.version, &owner("worker-a"), t0(), TTL)
            .await
            .unwrap()
    }

    fn failed_attempt(job: &Job) -> AttemptRecord {
        AttemptRecord::from_result(
            job.id,
            job.attempt_count,
            t0(),
            t0(),
            &Err(HandlerError::retryable("boom")),
        )
    }

    #[tokio::test]
    async fn create_sets_pending_with_first_run() {
        let (store, _) = store();
        let id = store.create(once_now(), t0()).await.unwrap();

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.next_run_at, Some(t0()));
        assert_eq!(job.version, 1);
        assert_eq!(job.max_attempts, 2);
    }

    #[tokio::test]
    async fn create_rejects_bad_cron() {
        let (store, _) = store();
        let err = store
            .create(JobSpec::new("x", Schedule::cron("nope")), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, CadenceError::InvalidSchedule(_)));
    }

    #[tokio::test]
    async fn claim_sets_lease_and_bumps_version() {
        let (store, _) = store();
        let id = store.create(once_now(), t0()).await.unwrap();

        let claimed = store
            .claim_due_jobs(t0(), 10, &owner("scheduler-a"), TTL)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        let job = &claimed[0];
        assert_eq!(job.id, id);
        assert_eq!(job.status, JobStatus::Claimed);
        assert_eq!(job.lease_owner, Some(owner("scheduler-a")));
        assert_eq!(job.lease_expires_at, Some(t0() + chrono::TimeDelta::seconds(30)));
        assert_eq!(job.version, 2);

        let again = store
            .claim_due_jobs(t0(), 10, &owner("scheduler-b"), TTL)
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn claim_skips_future_jobs_and_respects_batch() {
        let (store, _) = store();
        for _ in 0..3 {
            store.create(once_now(), t0()).await.unwrap();
        }
        let later = JobSpec::new("x", Schedule::once(t0() + chrono::TimeDelta::hours(1)));
        store.create(later, t0()).await.unwrap();

        let first = store
            .claim_due_jobs(t0(), 2, &owner("s"), TTL)
            .await
            .unwrap();
        let second = store
            .claim_due_jobs(t0(), 10, &owner("s"), TTL)
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_claimants_never_share_a_job() {
        let (store, _) = store();
        for _ in 0..50 {
            store.create(once_now(), t0()).await.unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let me = LeaseOwner::new(format!("scheduler-{i}"));
                let mut mine = Vec::new();
                loop {
                    let batch = store.claim_due_jobs(t0(), 3, &me, TTL).await.unwrap();
                    if batch.is_empty() {
                        break;
                    }
                    mine.extend(batch.into_iter().map(|j| j.id));
                }
                mine
            }));
        }

        let mut seen = HashSet::new();
        for h in handles {
            for id in h.await.unwrap() {
                assert!(seen.insert(id), "{id} claimed twice");
            }
        }
        assert_eq!(seen.len(), 50);
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let (store, _) = store();
        let id = store.create(once_now(), t0()).await.unwrap();
        let claimed = store
            .claim_due_jobs(t0(), 1, &owner("s"), TTL)
            .await
            .unwrap();

        let err = store.mark_queued(id, claimed[0].version - 1).await.unwrap_err();
        assert!(matches!(
            err,
            CadenceError::Conflict { expected: 1, actual: 2, .. }
        ));

        store.mark_queued(id, claimed[0].version).await.unwrap();
        let err = store.mark_queued(id, claimed[0].version).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn mark_running_increments_attempts_and_moves_lease() {
        let (store, _) = store();
        let job = running_job(&store).await;
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.attempt_count, 1);
        assert_eq!(job.lease_owner, Some(owner("worker-a")));
        assert_eq!(job.version, 4);
    }

    #[tokio::test]
    async fn mark_queued_after_lease_expiry_is_refused() {
        let (store, clock) = store();
        let id = store.create(once_now(), t0()).await.unwrap();
        let claimed = store
            .claim_due_jobs(t0(), 1, &owner("s"), TTL)
            .await
            .unwrap();

        clock.advance(Duration::from_secs(31));
        let err = store.mark_queued(id, claimed[0].version).await.unwrap_err();
        assert!(matches!(err, CadenceError::LeaseExpired(_)));
    }

    #[tokio::test]
    async fn release_claim_returns_job_to_pending() {
        let (store, _) = store();
        let id = store.create(once_now(), t0()).await.unwrap();
        let claimed = store
            .claim_due_jobs(t0(), 1, &owner("s"), TTL)
            .await
            .unwrap();

        let job = store.release_claim(id, claimed[0].version).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.lease_owner.is_none());
        assert!(job.is_due(t0()));
    }

    #[tokio::test]
    async fn retry_outcome_appends_attempt_and_schedules() {
        let (store, _) = store();
        let job = running_job(&store).await;
        let run_at = t0() + chrono::TimeDelta::seconds(2);

        let after = store
            .record_outcome(
                job.id,
                job.version,
                failed_attempt(&job),
                Decision::Retry {
                    delay: Duration::from_secs(2),
                    run_at,
                    reason: "retry".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(after.status, JobStatus::Retrying);
        assert_eq!(after.next_run_at, Some(run_at));
        assert!(after.lease_owner.is_none());
        assert_eq!(after.last_error.as_deref(), Some("boom"));

        let attempts = store.attempts(job.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].outcome, OutcomeKind::Failure);
        assert_eq!(attempts[0].attempt_number, 1);

        assert_eq!(store.promote_due_retries(t0()).await.unwrap(), 0);
        assert_eq!(store.promote_due_retries(run_at).await.unwrap(), 1);
        assert_eq!(store.get(job.id).await.unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn stale_outcome_is_rejected_without_attempt() {
        let (store, _) = store();
        let job = running_job(&store).await;

        let err = store
            .record_outcome(job.id, job.version - 1, failed_attempt(&job), Decision::Complete)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(store.attempts(job.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn outcome_lands_after_lease_lapses_until_reclaimed() {
        let (store, clock) = store();
        let job = running_job(&store).await;

        // the handler ran past its lease but nobody reclaimed the job
        clock.advance(Duration::from_secs(31));
        let attempt = AttemptRecord::from_result(
            job.id,
            job.attempt_count,
            t0(),
            clock.now(),
            &Err(HandlerError::Timeout(TTL)),
        );
        let after = store
            .record_outcome(
                job.id,
                job.version,
                attempt,
                Decision::Retry {
                    delay: Duration::from_secs(1),
                    run_at: clock.now(),
                    reason: "timeout".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(after.status, JobStatus::Retrying);
        let attempts = store.attempts(job.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].outcome, OutcomeKind::Timeout);
    }

    #[tokio::test]
    async fn outcome_after_reclaim_is_rejected() {
        let (store, clock) = store();
        let job = running_job(&store).await;

        clock.advance(Duration::from_secs(31));
        assert_eq!(store.reclaim_expired_leases(clock.now()).await.unwrap(), 1);

        let err = store
            .record_outcome(job.id, job.version, failed_attempt(&job), Decision::Complete)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.get(job.id).await.unwrap().status, JobStatus::Pending);
        // only the reclaim's own record
        assert_eq!(store.attempts(job.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_claim_cannot_be_queued_or_released() {
        let (store, _) = store();
        let id = store.create(once_now(), t0()).await.unwrap();
        let claimed = store
            .claim_due_jobs(t0(), 1, &owner("s"), TTL)
            .await
            .unwrap();
        let version = claimed[0].version;

        store.cancel(id, t0()).await.unwrap();

        let err = store.mark_queued(id, version).await.unwrap_err();
        assert!(err.is_conflict());
        let err = store.release_claim(id, version).await.unwrap_err();
        assert!(err.is_conflict());

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.next_run_at.is_none());
        assert!(job.lease_owner.is_none());
    }

    #[tokio::test]
    async fn reclaim_returns_expired_jobs_to_pending() {
        let (store, _) = store();
        let job = running_job(&store).await;

        assert_eq!(store.reclaim_expired_leases(t0()).await.unwrap(), 0);

        let later = t0() + chrono::TimeDelta::seconds(31);
        assert_eq!(store.reclaim_expired_leases(later).await.unwrap(), 1);
        assert_eq!(store.reclaim_expired_leases(later).await.unwrap(), 0);

        let after = store.get(job.id).await.unwrap();
        assert_eq!(after.status, JobStatus::Pending);
        assert_eq!(after.next_run_at, Some(later));
        assert!(after.lease_owner.is_none());
        assert!(after.version > job.version);

        let attempts = store.attempts(job.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].outcome, OutcomeKind::Timeout);
    }

    #[tokio::test]
    async fn cancel_clears_next_run_and_blocks_claims() {
        let (store, _) = store();
        let id = store.create(once_now(), t0()).await.unwrap();

        let job = store.cancel(id, t0()).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.next_run_at.is_none());

        // idempotent
        store.cancel(id, t0()).await.unwrap();

        let claimed = store
            .claim_due_jobs(t0(), 10, &owner("s"), TTL)
            .await
            .unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn running_job_cannot_be_cancelled() {
        let (store, _) = store();
        let job = running_job(&store).await;
        let err = store.cancel(job.id, t0()).await.unwrap_err();
        assert!(matches!(err, CadenceError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn update_respects_version_and_recomputes_next_run() {
        let (store, _) = store();
        let id = store.create(once_now(), t0()).await.unwrap();

        let patch = JobPatch {
            schedule: Some(Schedule::cron("0 * * * *")),
            max_attempts: Some(5),
            ..Default::default()
        };
        let err = store.update(id, 7, patch.clone(), t0()).await.unwrap_err();
        assert!(err.is_conflict());

        let job = store.update(id, 1, patch, t0()).await.unwrap();
        assert_eq!(job.version, 2);
        assert_eq!(job.max_attempts, 5);
        assert_eq!(job.next_run_at, Some(t0() + chrono::TimeDelta::hours(1)));
    }

    #[tokio::test]
    async fn replay_resets_dead_lettered_job() {
        let (store, _) = store();
        let job = running_job(&store).await;
        store
            .record_outcome(
                job.id,
                job.version,
                failed_attempt(&job),
                Decision::DeadLetter {
                    reason: "max attempts".into(),
                },
            )
            .await
            .unwrap();

        let replayed = store.replay(job.id, t0()).await.unwrap();
        assert_eq!(replayed.status, JobStatus::Pending);
        assert_eq!(replayed.attempt_count, 0);
        assert_eq!(replayed.next_run_at, Some(t0()));

        let err = store.replay(job.id, t0()).await.unwrap_err();
        assert!(matches!(err, CadenceError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn list_filters_by_status_and_type() {
        let (store, _) = store();
        let a = store.create(once_now(), t0()).await.unwrap();
        store
            .create(JobSpec::new("other.v1", Schedule::once(t0())), t0())
            .await
            .unwrap();
        store.cancel(a, t0()).await.unwrap();

        let cancelled = store
            .list(&JobFilter::default().with_status(JobStatus::Cancelled))
            .await
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, a);

        let other = store
            .list(&JobFilter::default().with_job_type(JobType::new("other.v1")))
            .await
            .unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(store.list(&JobFilter::default()).await.unwrap().len(), 2);
    }
}
