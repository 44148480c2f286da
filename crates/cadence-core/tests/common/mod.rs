#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use cadence_core::app::{App, AppBuilder, EngineConfig};
use cadence_core::domain::{HandlerError, HandlerResult};
use cadence_core::impls::{InMemoryJobStore, InMemoryTaskQueue, MemoryEventSink};
use cadence_core::ports::{Clock, FixedClock};
use cadence_core::typed::{Handler, JobContext, JobKind};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 2025-01-01 00:10:00Z, on a ten-minute cron boundary.
pub fn t() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 10, 0).unwrap()
}

/// Fails `failures` times, then succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flaky {
    pub failures: u32,
}

impl JobKind for Flaky {
    const TYPE: &'static str = "test.flaky.v1";
}

/// Never succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doomed;

impl JobKind for Doomed {
    const TYPE: &'static str = "test.doomed.v1";
}

/// Counts invocations per job type and remembers the dedup keys it saw.
#[derive(Clone, Default)]
pub struct Calls {
    pub flaky: Arc<AtomicU32>,
    pub doomed: Arc<AtomicU32>,
    pub dedup_keys: Arc<std::sync::Mutex<Vec<String>>>,
}

impl Calls {
    pub fn flaky(&self) -> u32 {
        self.flaky.load(Ordering::SeqCst)
    }

    pub fn doomed(&self) -> u32 {
        self.doomed.load(Ordering::SeqCst)
    }

    pub fn dedup_keys(&self) -> Vec<String> {
        self.dedup_keys.lock().unwrap().clone()
    }
}

struct FlakyHandler(Calls);

#[async_trait]
impl Handler<Flaky> for FlakyHandler {
    async fn handle(&self, job: Flaky, ctx: &JobContext) -> HandlerResult {
        self.0.flaky.fetch_add(1, Ordering::SeqCst);
        self.0.dedup_keys.lock().unwrap().push(ctx.dedup_key.clone());
        if ctx.attempt <= job.failures {
            return Err(HandlerError::retryable(format!("attempt {} failed", ctx.attempt)));
        }
        Ok(())
    }
}

struct DoomedHandler(Calls);

#[async_trait]
impl Handler<Doomed> for DoomedHandler {
    async fn handle(&self, _job: Doomed, _ctx: &JobContext) -> HandlerResult {
        self.0.doomed.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::retryable("always fails"))
    }
}

pub struct Harness {
    pub app: App,
    pub clock: FixedClock,
    pub store: Arc<InMemoryJobStore>,
    pub queue: Arc<InMemoryTaskQueue>,
    pub events: MemoryEventSink,
    pub calls: Calls,
}

/// Engine on a fixed clock at `t()`, retry jitter off.
pub fn harness() -> Harness {
    let clock = FixedClock::new(t());
    let store = Arc::new(InMemoryJobStore::new(Arc::new(clock.clone())));
    let queue = Arc::new(InMemoryTaskQueue::new(Arc::new(clock.clone())));
    let events = MemoryEventSink::new();
    let calls = Calls::default();

    let mut config = EngineConfig::default();
    config.retry.default.jitter = false;

    let app = AppBuilder::new(config)
        .register::<Flaky, _>(FlakyHandler(calls.clone()))
        .unwrap()
        .register::<Doomed, _>(DoomedHandler(calls.clone()))
        .unwrap()
        .expect_job_types(&[Flaky::TYPE, Doomed::TYPE])
        .with_clock(Arc::new(clock.clone()))
        .with_store(store.clone())
        .with_queue(queue.clone())
        .with_event_sink(Arc::new(events.clone()))
        .build()
        .unwrap();

    Harness {
        app,
        clock,
        store,
        queue,
        events,
        calls,
    }
}

impl Harness {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
