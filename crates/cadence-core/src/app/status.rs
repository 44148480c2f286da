//! Status - ジョブ状態の集計
//!
//! 運用向けのサマリ（status ごとの件数）。

use serde::{Deserialize, Serialize};

use crate::domain::{Job, JobStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub claimed: usize,
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub retrying: usize,
    pub dead_lettered: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        jobs.into_iter().fold(Self::default(), |mut counts, job| {
            *counts.slot(job.status) += 1;
            counts
        })
    }

    fn slot(&mut self, status: JobStatus) -> &mut usize {
        match status {
            JobStatus::Pending => &mut self.pending,
            JobStatus::Claimed => &mut self.claimed,
            JobStatus::Queued => &mut self.queued,
            JobStatus::Running => &mut self.running,
            JobStatus::Succeeded => &mut self.succeeded,
            JobStatus::Failed => &mut self.failed,
            JobStatus::Retrying => &mut self.retrying,
            JobStatus::DeadLettered => &mut self.dead_lettered,
            JobStatus::Cancelled => &mut self.cancelled,
        }
    }

    pub fn get(&self, status: JobStatus) -> usize {
        let mut copy = *self;
        *copy.slot(status)
    }

    pub fn total(&self) -> usize {
        JobStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }

    /// Jobs holding a lease right now.
    pub fn in_flight(&self) -> usize {
        self.claimed + self.queued + self.running
    }
}
