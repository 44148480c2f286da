//! SchedulerLoop - due ジョブの claim と enqueue
//!
//! # フロー（1 tick）
//! 1. 期限切れ lease の回収（`reclaim_interval` ごと）
//! 2. backoff の終わった Retrying を Pending に戻す
//! 3. `claim_due_jobs` で due ジョブを atomic に claim
//! 4. TaskEnvelope を enqueue → `mark_queued`
//!    enqueue 失敗時は `release_claim` で Pending に戻す
//!
//! 何台並べても同じジョブを二重に claim しません（JobStore が保証）。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::backoff::InfraBackoff;
use super::config::SchedulerConfig;
use crate::domain::{CadenceError, DomainEvent, Job, LeaseOwner, TaskEnvelope};
use crate::ports::{Clock, EventSink, JobStore, TaskQueue};

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub reclaimed: usize,
    pub promoted: usize,
    pub claimed: usize,
    pub queued: usize,
    /// Claimed jobs that did not make it to `Queued` this tick.
    pub enqueue_failures: usize,
}

pub struct SchedulerLoop {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    claimant: LeaseOwner,
    last_reclaim: Option<DateTime<Utc>>,
}

impl SchedulerLoop {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn TaskQueue>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let claimant = config.claimant();
        Self {
            store,
            queue,
            events,
            clock,
            config,
            claimant,
            last_reclaim: None,
        }
    }

    pub fn claimant(&self) -> &LeaseOwner {
        &self.claimant
    }

    fn reclaim_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_reclaim {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= self.config.reclaim_interval()),
        }
    }

    /// One pass. Store errors abort the tick; enqueue errors only affect the
    /// job at hand.
    pub async fn tick(&mut self) -> Result<TickReport, CadenceError> {
        let now = self.clock.now();
        let mut report = TickReport::default();

        if self.reclaim_due(now) {
            report.reclaimed = self.store.reclaim_expired_leases(now).await?;
            self.last_reclaim = Some(now);
            if report.reclaimed > 0 {
                info!(count = report.reclaimed, "reclaimed expired leases");
                self.events.emit(DomainEvent::LeasesReclaimed {
                    count: report.reclaimed,
                });
            }
        }

        report.promoted = self.store.promote_due_retries(now).await?;

        let claimed = self
            .store
            .claim_due_jobs(
                now,
                self.config.batch_size,
                &self.claimant,
                self.config.lease_ttl(),
            )
            .await?;
        report.claimed = claimed.len();

        for job in claimed {
            self.events.emit(DomainEvent::JobClaimed {
                job_id: job.id,
                job_type: job.job_type.clone(),
                latency: lag(job.next_run_at, now),
            });
            if self.dispatch(&job).await {
                report.queued += 1;
            } else {
                report.enqueue_failures += 1;
            }
        }

        Ok(report)
    }

    async fn dispatch(&self, job: &Job) -> bool {
        let envelope = TaskEnvelope::for_claimed(job);

        if let Err(e) = self.queue.enqueue(envelope).await {
            warn!(job.id = %job.id, error = %e, "enqueue failed, releasing claim");
            if let Err(e) = self.store.release_claim(job.id, job.version).await {
                // the lease runs out and reclaim picks it up
                warn!(job.id = %job.id, error = %e, "release_claim failed");
            }
            return false;
        }

        match self.store.mark_queued(job.id, job.version).await {
            Ok(queued) => {
                debug!(job.id = %job.id, version = queued.version, "job queued");
                self.events.emit(DomainEvent::JobQueued {
                    job_id: job.id,
                    job_type: job.job_type.clone(),
                });
                true
            }
            Err(e) => {
                // the enqueued message is now stale and workers will drop it
                warn!(job.id = %job.id, error = %e, "mark_queued failed after enqueue");
                false
            }
        }
    }

    /// Tick until `shutdown` flips to true (or its sender is dropped).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = InfraBackoff::new();
        info!(claimant = %self.claimant, "scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.tick().await {
                Ok(report) => {
                    backoff.reset();
                    if report.claimed > 0 || report.reclaimed > 0 {
                        debug!(?report, "scheduler tick");
                    }
                    self.config.tick_interval()
                }
                Err(e) => {
                    let delay = backoff.on_failure();
                    warn!(
                        error = %e,
                        failures = backoff.failures(),
                        retry_in_ms = delay.as_millis() as u64,
                        "scheduler tick failed"
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

        info!(claimant = %self.claimant, "scheduler stopped");
    }
}

/// `now - at`, zero when `at` is missing or in the future.
pub(crate) fn lag(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
    at.and_then(|at| (now - at).to_std().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobSpec, JobStatus, Schedule};
    use crate::impls::{InMemoryJobStore, InMemoryTaskQueue, MemoryEventSink};
    use crate::ports::FixedClock;
    use chrono::TimeZone;

    struct Fixture {
        store: Arc<InMemoryJobStore>,
        queue: Arc<InMemoryTaskQueue>,
        events: MemoryEventSink,
        clock: FixedClock,
        scheduler: SchedulerLoop,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let clock = FixedClock::new(t0());
        let store = Arc::new(InMemoryJobStore::new(Arc::new(clock.clone())));
        let queue = Arc::new(InMemoryTaskQueue::new(Arc::new(clock.clone())));
        let events = MemoryEventSink::new();
        let scheduler = SchedulerLoop::new(
            store.clone(),
            queue.clone(),
            Arc::new(events.clone()),
            Arc::new(clock.clone()),
            SchedulerConfig {
                claimant_id: Some("scheduler-test".into()),
                ..Default::default()
            },
        );
        Fixture {
            store,
            queue,
            events,
            clock,
            scheduler,
        }
    }

    #[tokio::test]
    async fn due_job_is_claimed_and_queued() {
        let mut f = fixture();
        let id = f
            .store
            .create(JobSpec::new("a.v1", Schedule::once(t0())), t0())
            .await
            .unwrap();

        let report = f.scheduler.tick().await.unwrap();
        assert_eq!(report.claimed, 1);
        assert_eq!(report.queued, 1);

        let job = f.store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        let delivery = f
            .queue
            .dequeue(Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.envelope.job_id(), id);
        assert_eq!(delivery.envelope.version(), job.version);
        assert_eq!(f.events.named("job_claimed").len(), 1);
        assert_eq!(f.events.named("job_queued").len(), 1);
    }

    #[tokio::test]
    async fn future_job_is_left_alone() {
        let mut f = fixture();
        let later = t0() + chrono::TimeDelta::minutes(5);
        f.store
            .create(JobSpec::new("a.v1", Schedule::once(later)), t0())
            .await
            .unwrap();

        assert_eq!(f.scheduler.tick().await.unwrap().claimed, 0);
        f.clock.set(later);
        assert_eq!(f.scheduler.tick().await.unwrap().claimed, 1);
    }

    #[tokio::test]
    async fn failed_enqueue_releases_the_claim() {
        let mut f = fixture();
        let id = f
            .store
            .create(JobSpec::new("a.v1", Schedule::once(t0())), t0())
            .await
            .unwrap();

        f.queue.set_unavailable(true);
        let report = f.scheduler.tick().await.unwrap();
        assert_eq!(report.enqueue_failures, 1);
        let job = f.store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.lease_owner.is_none());

        f.queue.set_unavailable(false);
        assert_eq!(f.scheduler.tick().await.unwrap().queued, 1);
    }

    #[tokio::test]
    async fn reclaim_runs_on_its_own_interval() {
        let mut f = fixture();
        f.store
            .create(JobSpec::new("a.v1", Schedule::once(t0())), t0())
            .await
            .unwrap();
        f.scheduler.tick().await.unwrap();

        f.clock.advance(Duration::from_secs(31));
        let report = f.scheduler.tick().await.unwrap();
        assert_eq!(report.reclaimed, 1);
        assert_eq!(report.claimed, 1);
        assert_eq!(f.events.named("leases_reclaimed").len(), 1);

        // within reclaim_interval of the previous pass
        f.clock.advance(Duration::from_secs(1));
        assert_eq!(f.scheduler.tick().await.unwrap().reclaimed, 0);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let f = fixture();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(f.scheduler.run(rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn lag_is_never_negative() {
        let now = t0();
        assert_eq!(lag(Some(now + chrono::TimeDelta::seconds(5)), now), Duration::ZERO);
        assert_eq!(lag(Some(now - chrono::TimeDelta::seconds(5)), now), Duration::from_secs(5));
        assert_eq!(lag(None, now), Duration::ZERO);
    }
}
