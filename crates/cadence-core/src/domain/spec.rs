//! Job API inputs (create / update / list).

use serde::{Deserialize, Serialize};

use super::job::Job;
use super::job_type::JobType;
use super::schedule::Schedule;
use super::state::JobStatus;

/// What the Job API hands the store to create a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub job_type: JobType,

    #[serde(default)]
    pub payload: serde_json::Value,

    pub schedule: Schedule,

    /// Falls back to the job type's retry policy when absent.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl JobSpec {
    pub fn new(job_type: impl Into<JobType>, schedule: Schedule) -> Self {
        Self {
            job_type: job_type.into(),
            payload: serde_json::Value::Null,
            schedule,
            max_attempts: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// Fields the Job API may change on an existing job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl JobPatch {
    pub fn is_empty(&self) -> bool {
        self.payload.is_none() && self.schedule.is_none() && self.max_attempts.is_none()
    }
}

/// Filters for `list`. Empty filter matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFilter {
    #[serde(default)]
    pub status: Option<JobStatus>,

    #[serde(default)]
    pub job_type: Option<JobType>,

    #[serde(default)]
    pub limit: Option<usize>,
}

impl JobFilter {
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_job_type(mut self, job_type: impl Into<JobType>) -> Self {
        self.job_type = Some(job_type.into());
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| job.status == s)
            && self.job_type.as_ref().is_none_or(|t| &job.job_type == t)
    }
}
