//! デモ用のジョブ種別とハンドラ

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use cadence_core::domain::{HandlerError, HandlerResult};
use cadence_core::{Handler, JobContext, JobKind};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub source: String,
}

impl JobKind for Heartbeat {
    const TYPE: &'static str = "demo.heartbeat.v1";
}

#[derive(Default)]
pub struct HeartbeatHandler {
    beats: AtomicU64,
}

#[async_trait]
impl Handler<Heartbeat> for HeartbeatHandler {
    async fn handle(&self, job: Heartbeat, ctx: &JobContext) -> HandlerResult {
        let n = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
        info!(source = %job.source, beat = n, dedup_key = %ctx.dedup_key, "heartbeat");
        Ok(())
    }
}

/// Fails its first `fail_first` attempts to show the retry path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReport {
    pub recipient: String,
    pub fail_first: u32,
}

impl JobKind for SendReport {
    const TYPE: &'static str = "demo.report.send.v1";
}

pub struct SendReportHandler;

#[async_trait]
impl Handler<SendReport> for SendReportHandler {
    async fn handle(&self, job: SendReport, ctx: &JobContext) -> HandlerResult {
        if job.recipient.is_empty() {
            return Err(HandlerError::permanent("empty recipient"));
        }
        if ctx.attempt <= job.fail_first {
            return Err(HandlerError::retryable(format!(
                "smtp unavailable (attempt {})",
                ctx.attempt
            )));
        }
        info!(recipient = %job.recipient, attempt = ctx.attempt, "report sent");
        Ok(())
    }
}
