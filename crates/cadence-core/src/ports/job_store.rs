//! JobStore port - ジョブの正本（source of truth）
//!
//! JobStore は以下を管理します：
//! - ジョブの状態・スケジュール・lease
//! - 試行履歴（attempts）
//!
//! # 設計原則
//! - すべての状態変更は 1 回の atomic な read-modify-write
//! - version による楽観的排他制御。古い version での書き込みは `Conflict`
//! - lease の権威はここにある（queue の配送は候補通知に過ぎない）
//!
//! A SQL backend implements `claim_due_jobs` as one transaction
//! (`SELECT ... FOR UPDATE SKIP LOCKED` + `UPDATE`), the other writes as
//! `UPDATE ... WHERE id = $1 AND version = $2`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AttemptRecord, CadenceError, Decision, Job, JobFilter, JobId, JobPatch, JobSpec, LeaseOwner,
};

#[async_trait]
pub trait JobStore: Send + Sync {
    // ---- claim protocol ----

    /// Atomically claim up to `batch_size` due jobs (`Pending`, `next_run_at <= now`,
    /// no live lease), ordered by `next_run_at`. Claimed jobs move to `Claimed`
    /// with a lease for `claimant` until `now + lease_ttl`.
    ///
    /// Two concurrent callers never receive the same job.
    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        batch_size: usize,
        claimant: &LeaseOwner,
        lease_ttl: Duration,
    ) -> Result<Vec<Job>, CadenceError>;

    /// `Claimed -> Queued` after a successful enqueue.
    async fn mark_queued(&self, job_id: JobId, version: u64) -> Result<Job, CadenceError>;

    /// `Claimed -> Pending` when the enqueue failed synchronously.
    async fn release_claim(&self, job_id: JobId, version: u64) -> Result<Job, CadenceError>;

    /// `Queued -> Running`: lease moves to `worker` and the attempt count increments.
    async fn mark_running(
        &self,
        job_id: JobId,
        version: u64,
        worker: &LeaseOwner,
        now: DateTime<Utc>,
        lease_ttl: Duration,
    ) -> Result<Job, CadenceError>;

    /// Append `attempt`, then apply `decision`. Both happen or neither does.
    ///
    /// Guarded by `version` alone. A lease that lapsed while the handler ran
    /// does not void the outcome unless the job was reclaimed in between.
    async fn record_outcome(
        &self,
        job_id: JobId,
        version: u64,
        attempt: AttemptRecord,
        decision: Decision,
    ) -> Result<Job, CadenceError>;

    /// Return `Claimed | Queued | Running` jobs whose lease expired before `now`
    /// to `Pending` with `next_run_at = now`. Returns how many were reclaimed.
    async fn reclaim_expired_leases(&self, now: DateTime<Utc>) -> Result<usize, CadenceError>;

    /// `Retrying -> Pending` for jobs whose backoff elapsed.
    async fn promote_due_retries(&self, now: DateTime<Utc>) -> Result<usize, CadenceError>;

    // ---- Job API boundary ----

    async fn create(&self, spec: JobSpec, now: DateTime<Utc>) -> Result<JobId, CadenceError>;

    async fn get(&self, job_id: JobId) -> Result<Job, CadenceError>;

    async fn update(
        &self,
        job_id: JobId,
        version: u64,
        patch: JobPatch,
        now: DateTime<Utc>,
    ) -> Result<Job, CadenceError>;

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, CadenceError>;

    /// Logical delete. Idempotent on an already cancelled job.
    async fn cancel(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, CadenceError>;

    /// Operator replay: `DeadLettered | Failed -> Pending` with a fresh attempt budget.
    async fn replay(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, CadenceError>;

    /// Attempt history ordered by attempt number.
    async fn attempts(&self, job_id: JobId) -> Result<Vec<AttemptRecord>, CadenceError>;
}
