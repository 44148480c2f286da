//! Errors - エラー型と分類
//!
//! `CadenceError` はエンジン全体のエラー、`HandlerError` はジョブ固有の実行失敗です。
//! 呼び出し側（ループ）は `ErrorKind` を見て「放棄 / バックオフ / 表面化」を決めます。

use std::time::Duration;

use thiserror::Error;

use super::ids::JobId;
use super::state::JobStatus;

/// ErrorKind は運用上の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Stale version: re-read and redo the higher-level operation.
    Conflict,
    /// Lease expiry, handled as crash recovery.
    Recovery,
    /// Job-specific execution failure, feeds the retry policy.
    Job,
    /// Store or queue unavailable: back off and retry the infrastructure call.
    Infrastructure,
    /// Attempt budget exhausted.
    Terminal,
    /// Bad input from the Job API caller or bad configuration.
    Client,
}

#[derive(Debug, Error)]
pub enum CadenceError {
    #[error("version conflict on {job_id}: expected {expected}, found {actual}")]
    Conflict {
        job_id: JobId,
        expected: u64,
        actual: u64,
    },

    #[error("lease expired on {0}")]
    LeaseExpired(JobId),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{job_id} exhausted its attempt budget after {attempts} attempts")]
    Terminal { job_id: JobId, attempts: u32 },

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("invalid transition on {job_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CadenceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::LeaseExpired(_) => ErrorKind::Recovery,
            Self::Handler(_) => ErrorKind::Job,
            Self::Transport(_) => ErrorKind::Infrastructure,
            Self::Terminal { .. } => ErrorKind::Terminal,
            Self::NotFound(_)
            | Self::InvalidTransition { .. }
            | Self::InvalidSchedule(_)
            | Self::Configuration(_) => ErrorKind::Client,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure
    }
}

/// Failure reported by a job handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// Worth another attempt (subject to the retry policy).
    #[error("{0}")]
    Retryable(String),

    /// Will fail the same way every time (bad payload, rejected input).
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// Handler exceeded its execution budget.
    #[error("handler timed out after {0:?}")]
    Timeout(Duration),
}

impl HandlerError {
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn errors_are_classified() {
        let job_id = JobId::from_ulid(Ulid::new());
        let conflict = CadenceError::Conflict {
            job_id,
            expected: 3,
            actual: 4,
        };
        assert!(conflict.is_conflict());
        assert!(CadenceError::Transport("redis down".into()).is_transport());
        assert_eq!(
            CadenceError::from(HandlerError::retryable("boom")).kind(),
            ErrorKind::Job
        );
        assert_eq!(CadenceError::NotFound(job_id).kind(), ErrorKind::Client);
    }

    #[test]
    fn conflict_message_names_versions() {
        let job_id = JobId::from_ulid(Ulid::new());
        let msg = CadenceError::Conflict {
            job_id,
            expected: 3,
            actual: 4,
        }
        .to_string();
        assert!(msg.contains("expected 3"));
        assert!(msg.contains("found 4"));
    }
}
