//! WorkerPool - ジョブ実行ループ
//!
//! # フロー（1 delivery）
//! 1. `TaskQueue::dequeue` で envelope を受け取る
//! 2. JobStore の正本と突き合わせる（status = Queued かつ version 一致のときだけ実行）
//! 3. `mark_running` で lease を worker に移す
//! 4. Handler 実行（timeout 付き、panic は失敗として扱う）
//! 5. Decider で Decision を作り、`record_outcome` で attempt と一緒に適用
//! 6. ack
//!
//! 正本が古い配送だと言っているものは実行せずに ack します。
//! ストアに書けなかったときは ack しません（visibility timeout 後に再配送）。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use super::backoff::InfraBackoff;
use super::config::WorkerConfig;
use super::scheduler_loop::lag;
use crate::domain::{
    AttemptRecord, CadenceError, Decider, Decision, DomainEvent, ErrorKind, HandlerError,
    HandlerResult, Job, JobId, JobStatus, LeaseOwner, OutcomeKind,
};
use crate::ports::{AckToken, Clock, Delivery, EventSink, JobStore, TaskQueue};
use crate::typed::{DynHandler, HandlerRegistry, JobContext};

/// What `process_one` did with a delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    /// The handler ran and its outcome was recorded.
    Executed {
        job_id: JobId,
        outcome: OutcomeKind,
        status: JobStatus,
    },
    /// Stale or duplicate delivery; acked without running.
    Skipped { job_id: JobId },
    /// Handed back to the queue to try later.
    Deferred { job_id: JobId },
}

impl Processed {
    pub fn job_id(&self) -> JobId {
        match self {
            Processed::Executed { job_id, .. }
            | Processed::Skipped { job_id }
            | Processed::Deferred { job_id } => *job_id,
        }
    }
}

/// A set of identical workers sharing one store, queue and registry.
///
/// Each spawned task gets its own `LeaseOwner` (`{pool}-{index}`).
#[derive(Clone)]
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    registry: Arc<HandlerRegistry>,
    decider: Arc<dyn Decider>,
    config: WorkerConfig,
    worker_id: LeaseOwner,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn TaskQueue>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        registry: Arc<HandlerRegistry>,
        decider: Arc<dyn Decider>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            queue,
            events,
            clock,
            registry,
            decider,
            config,
            worker_id: LeaseOwner::generate("worker"),
        }
    }

    pub fn with_worker_id(mut self, worker_id: LeaseOwner) -> Self {
        self.worker_id = worker_id;
        self
    }

    pub fn worker_id(&self) -> &LeaseOwner {
        &self.worker_id
    }

    /// Spawn `config.concurrency` workers that stop when `shutdown` flips.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        (0..self.config.concurrency)
            .map(|index| {
                let worker = self
                    .clone()
                    .with_worker_id(LeaseOwner::new(format!("{}-{index}", self.worker_id)));
                let span = info_span!("worker", worker.id = %worker.worker_id);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker.run(shutdown).await }.instrument(span))
            })
            .collect()
    }

    fn poll_delay(&self) -> Duration {
        let jitter = self.config.poll_jitter();
        if jitter.is_zero() {
            return self.config.poll_interval();
        }
        let jitter_millis = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
        let random_jitter = rand::thread_rng().gen_range(0..=jitter_millis);
        self.config.poll_interval() + Duration::from_millis(random_jitter)
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = InfraBackoff::new();
        debug!("worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            // the attempt in flight always runs to completion
            let delay = match self.process_one().await {
                Ok(Some(_)) => {
                    backoff.reset();
                    continue;
                }
                Ok(None) => {
                    backoff.reset();
                    let delay = self.poll_delay();
                    trace!("queue empty, polling again in {delay:?}");
                    delay
                }
                Err(e) => {
                    let delay = backoff.on_failure();
                    warn!(
                        error = %e,
                        failures = backoff.failures(),
                        retry_in_ms = delay.as_millis() as u64,
                        "worker pass failed"
                    );
                    delay
                }
            };

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("worker stopped");
    }

    /// Take at most one delivery and process it. `None` when the queue had
    /// nothing visible.
    pub async fn process_one(&self) -> Result<Option<Processed>, CadenceError> {
        let Some(delivery) = self
            .queue
            .dequeue(self.config.visibility_timeout())
            .await?
        else {
            return Ok(None);
        };

        let span = info_span!(
            "job",
            job.id = %delivery.envelope.job_id(),
            job.type = %delivery.envelope.job_type(),
            version = delivery.envelope.version(),
            delivery = delivery.delivery_count,
        );
        self.process_delivery(delivery).instrument(span).await.map(Some)
    }

    async fn process_delivery(&self, delivery: Delivery) -> Result<Processed, CadenceError> {
        let Delivery {
            envelope, token, ..
        } = delivery;
        let job_id = envelope.job_id();

        let job = match self.store.get(job_id).await {
            Ok(job) => job,
            Err(CadenceError::NotFound(_)) => {
                warn!("delivery for unknown job, dropping");
                self.ack(token).await;
                return Ok(Processed::Skipped { job_id });
            }
            Err(e) => return Err(e),
        };

        // enqueued but the scheduler has not committed mark_queued yet
        if job.status == JobStatus::Claimed && job.version + 1 == envelope.version() {
            debug!("job not yet marked queued, deferring");
            self.nack(token, self.config.requeue_delay()).await;
            return Ok(Processed::Deferred { job_id });
        }

        if job.status != JobStatus::Queued || job.version != envelope.version() {
            debug!(
                status = %job.status,
                stored_version = job.version,
                "stale delivery, acking without running"
            );
            self.ack(token).await;
            return Ok(Processed::Skipped { job_id });
        }

        let Some(handler) = self.registry.get(envelope.job_type()) else {
            warn!("no handler registered for job type, handing back");
            self.nack(token, self.config.visibility_timeout()).await;
            return Ok(Processed::Deferred { job_id });
        };

        let now = self.clock.now();
        let running = match self
            .store
            .mark_running(
                job_id,
                envelope.version(),
                &self.worker_id,
                now,
                self.config.lease_ttl(),
            )
            .await
        {
            Ok(job) => job,
            Err(e) if matches!(e.kind(), ErrorKind::Conflict | ErrorKind::Recovery) => {
                debug!(error = %e, "lost the race to mark_running, acking");
                self.ack(token).await;
                return Ok(Processed::Skipped { job_id });
            }
            Err(e) if e.kind() == ErrorKind::Infrastructure => return Err(e),
            Err(e) => {
                warn!(error = %e, kind = ?e.kind(), "mark_running refused, acking");
                self.ack(token).await;
                return Ok(Processed::Skipped { job_id });
            }
        };

        self.events.emit(DomainEvent::JobStarted {
            job_id,
            job_type: running.job_type.clone(),
            attempt: running.attempt_count,
            latency: lag(running.occurrence_at.or(job.next_run_at), now),
        });

        let ctx = JobContext {
            job_id,
            job_type: running.job_type.clone(),
            attempt: running.attempt_count,
            dedup_key: envelope.dedup_key().to_string(),
        };
        let started_at = self.clock.now();
        let result = self
            .execute(handler, envelope.payload().clone(), ctx)
            .await;
        let finished_at = self.clock.now();

        let attempt = AttemptRecord::from_result(
            job_id,
            running.attempt_count,
            started_at,
            finished_at,
            &result,
        );
        let decision = self.decider.decide(&running, &result, finished_at);

        match self
            .store
            .record_outcome(job_id, running.version, attempt, decision.clone())
            .await
        {
            Ok(after) => {
                self.report(&running, &result, &decision, started_at, finished_at);
                self.ack(token).await;
                Ok(Processed::Executed {
                    job_id,
                    outcome: OutcomeKind::of(&result),
                    status: after.status,
                })
            }
            Err(e) if e.kind() != ErrorKind::Infrastructure => {
                // someone reclaimed the job while it ran; their view wins
                warn!(error = %e, "outcome discarded");
                self.ack(token).await;
                Ok(Processed::Skipped { job_id })
            }
            Err(e) => Err(e),
        }
    }

    /// Run the handler on its own task so a panic or a timeout cannot take
    /// the worker down with it.
    async fn execute(
        &self,
        handler: Arc<dyn DynHandler>,
        payload: serde_json::Value,
        ctx: JobContext,
    ) -> HandlerResult {
        let timeout = self.config.handler_timeout();
        let mut task = tokio::spawn(async move { handler.handle_dyn(payload, &ctx).await });

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                error!(error = %join_error, "handler panicked");
                Err(HandlerError::retryable(format!("handler panicked: {join_error}")))
            }
            Err(_) => {
                task.abort();
                Err(HandlerError::Timeout(timeout))
            }
        }
    }

    fn report(
        &self,
        job: &Job,
        result: &HandlerResult,
        decision: &Decision,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) {
        let duration = (finished_at - started_at).to_std().unwrap_or_default();
        let attempt = job.attempt_count;

        match result {
            Ok(()) => {
                info!(attempt, duration_ms = duration.as_millis() as u64, "job succeeded");
                self.events.emit(DomainEvent::JobSucceeded {
                    job_id: job.id,
                    job_type: job.job_type.clone(),
                    attempt,
                    duration,
                });
            }
            Err(e) => {
                let will_retry = matches!(decision, Decision::Retry { .. });
                warn!(attempt, error = %e, will_retry, "job attempt failed");
                self.events.emit(DomainEvent::JobFailed {
                    job_id: job.id,
                    job_type: job.job_type.clone(),
                    attempt,
                    duration,
                    will_retry,
                });
            }
        }

        if let Decision::DeadLetter { .. } = decision {
            let terminal = CadenceError::Terminal {
                job_id: job.id,
                attempts: attempt,
            };
            error!(error = %terminal, "job dead-lettered");
            self.events.emit(DomainEvent::JobDeadLettered {
                job_id: job.id,
                job_type: job.job_type.clone(),
                attempts: attempt,
            });
        }
    }

    async fn ack(&self, token: AckToken) {
        if let Err(e) = self.queue.ack(token).await {
            // redelivery is harmless: the store already moved on
            warn!(error = %e, "ack failed");
        }
    }

    async fn nack(&self, token: AckToken, delay: Duration) {
        if let Err(e) = self.queue.nack(token, delay).await {
            warn!(error = %e, "nack failed");
        }
    }
}
