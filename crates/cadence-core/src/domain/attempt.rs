//! Attempt history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::JobId;
use super::outcome::{HandlerResult, OutcomeKind};

/// A single execution try of a job, keyed by `(job_id, attempt_number)`.
///
/// Records are append-only. A handler failure is always written here before
/// any retry decision is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub job_id: JobId,
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: OutcomeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl AttemptRecord {
    pub fn from_result(
        job_id: JobId,
        attempt_number: u32,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        result: &HandlerResult,
    ) -> Self {
        Self {
            job_id,
            attempt_number,
            started_at,
            finished_at,
            outcome: OutcomeKind::of(result),
            error_detail: result.as_ref().err().map(|e| e.to_string()),
        }
    }

    /// Attempt abandoned because its holder's lease ran out.
    pub fn lease_expired(
        job_id: JobId,
        attempt_number: u32,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            attempt_number,
            started_at,
            finished_at,
            outcome: OutcomeKind::Timeout,
            error_detail: Some("lease expired".to_string()),
        }
    }
}
