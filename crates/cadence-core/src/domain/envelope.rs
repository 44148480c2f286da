//! TaskEnvelope - queue に流すメッセージ本体
//!
//! Wire shape: `{job_id, version, job_type, payload, dedup_key}`. The backend
//! decides the byte encoding; the in-memory queue keeps the struct as-is.

use serde::{Deserialize, Serialize};

use super::ids::JobId;
use super::job::Job;
use super::job_type::JobType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    job_id: JobId,
    version: u64,
    job_type: JobType,
    payload: serde_json::Value,
    dedup_key: String,
}

impl TaskEnvelope {
    pub fn new(
        job_id: JobId,
        version: u64,
        job_type: JobType,
        payload: serde_json::Value,
        dedup_key: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            version,
            job_type,
            payload,
            dedup_key: dedup_key.into(),
        }
    }

    /// Envelope for a freshly claimed job.
    ///
    /// Carries the version the job will hold once `mark_queued` commits
    /// (claimed version + 1), which is what a worker must observe to act.
    pub fn for_claimed(job: &Job) -> Self {
        Self::new(
            job.id,
            job.version + 1,
            job.job_type.clone(),
            job.payload.clone(),
            job.dedup_key(),
        )
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn job_type(&self) -> &JobType {
        &self.job_type
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn dedup_key(&self) -> &str {
        &self.dedup_key
    }
}
