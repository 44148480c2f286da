//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - ハンドルは起動時に作って明示的に渡す（グローバル状態にしない）

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span};

use super::config::EngineConfig;
use super::scheduler_loop::SchedulerLoop;
use super::status::StatusCounts;
use super::worker_loop::WorkerPool;
use crate::domain::{
    AttemptRecord, CadenceError, Decider, DefaultDecider, Job, JobFilter, JobId, JobPatch,
    JobSpec, JobType, Schedule,
};
use crate::impls::{InMemoryJobStore, InMemoryTaskQueue, TracingEventSink};
use crate::ports::{Clock, EventSink, JobStore, SystemClock, TaskQueue};
use crate::typed::{Handler, HandlerRegistry, JobKind, RegistryError};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(config)
///     .register::<SendDigest, _>(SendDigestHandler)?
///     .expect_job_types(&["mail.digest.send.v1"])
///     .build()?;
/// let handle = app.start().await?;
/// ```
///
/// 指定しなかった port はインメモリ実装（と SystemClock / TracingEventSink）で埋めます。
///
/// # Fail-fast 設計
/// - `expect_job_types()` で期待される job_type を宣言
/// - `build()` 時に「期待集合 ⊆ 登録済み集合」と設定値をチェック
pub struct AppBuilder {
    config: EngineConfig,
    registry: HandlerRegistry,
    expected_job_types: Vec<JobType>,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn JobStore>>,
    queue: Option<Arc<dyn TaskQueue>>,
    events: Option<Arc<dyn EventSink>>,
    decider: Option<Arc<dyn Decider>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing job types: {0:?}; these were expected but have no handler")]
    MissingJobTypes(Vec<JobType>),

    #[error(transparent)]
    InvalidConfig(#[from] CadenceError),
}

impl AppBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: HandlerRegistry::new(),
            expected_job_types: Vec::new(),
            clock: None,
            store: None,
            queue: None,
            events: None,
            decider: None,
        }
    }

    pub fn register<T: JobKind, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn expect_job_types(mut self, job_types: &[&str]) -> Self {
        self.expected_job_types = job_types.iter().map(|t| JobType::new(*t)).collect();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;

        let missing: Vec<JobType> = self
            .expected_job_types
            .iter()
            .filter(|t| !self.registry.contains(t))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(BuildError::MissingJobTypes(missing));
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryJobStore::new(clock.clone())));
        let queue = self
            .queue
            .unwrap_or_else(|| Arc::new(InMemoryTaskQueue::new(clock.clone())));
        let events = self.events.unwrap_or_else(|| Arc::new(TracingEventSink));
        let decider = self
            .decider
            .unwrap_or_else(|| Arc::new(DefaultDecider::new(self.config.retry.clone())));

        Ok(App {
            config: self.config,
            registry: Arc::new(self.registry),
            clock,
            store,
            queue,
            events,
            decider,
        })
    }
}

/// App は組み立て済みのエンジン
///
/// Job API（create / get / list / update / cancel / replay / attempts）と、
/// SchedulerLoop / WorkerPool の生成・起動を提供します。
pub struct App {
    config: EngineConfig,
    registry: Arc<HandlerRegistry>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
    events: Arc<dyn EventSink>,
    decider: Arc<dyn Decider>,
}

impl App {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    // ---- Job API ----

    /// Rejects job types without a registered handler. `max_attempts`
    /// defaults to the type's retry policy.
    pub async fn create_job(&self, mut spec: JobSpec) -> Result<JobId, CadenceError> {
        self.registry.ensure_registered([&spec.job_type])?;
        if spec.max_attempts.is_none() {
            spec.max_attempts = Some(self.config.retry.for_type(&spec.job_type).max_attempts);
        }
        let job_id = self.store.create(spec, self.clock.now()).await?;
        info!(job.id = %job_id, "job created");
        Ok(job_id)
    }

    /// Typed shorthand for `create_job`.
    pub async fn schedule<T: JobKind>(
        &self,
        job: &T,
        schedule: Schedule,
    ) -> Result<JobId, CadenceError> {
        let spec = job
            .to_spec(schedule)
            .map_err(|e| CadenceError::Configuration(format!("payload encode: {e}")))?;
        self.create_job(spec).await
    }

    pub async fn get(&self, job_id: JobId) -> Result<Job, CadenceError> {
        self.store.get(job_id).await
    }

    pub async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, CadenceError> {
        self.store.list(filter).await
    }

    pub async fn update(
        &self,
        job_id: JobId,
        expected_version: u64,
        patch: JobPatch,
    ) -> Result<Job, CadenceError> {
        self.store
            .update(job_id, expected_version, patch, self.clock.now())
            .await
    }

    pub async fn cancel(&self, job_id: JobId) -> Result<Job, CadenceError> {
        let job = self.store.cancel(job_id, self.clock.now()).await?;
        info!(job.id = %job_id, "job cancelled");
        Ok(job)
    }

    pub async fn replay(&self, job_id: JobId) -> Result<Job, CadenceError> {
        let job = self.store.replay(job_id, self.clock.now()).await?;
        info!(job.id = %job_id, "job replayed");
        Ok(job)
    }

    pub async fn attempts(&self, job_id: JobId) -> Result<Vec<AttemptRecord>, CadenceError> {
        self.store.attempts(job_id).await
    }

    pub async fn status_counts(&self) -> Result<StatusCounts, CadenceError> {
        let jobs = self.store.list(&JobFilter::default()).await?;
        Ok(StatusCounts::from_jobs(&jobs))
    }

    // ---- loops ----

    pub fn scheduler(&self) -> SchedulerLoop {
        SchedulerLoop::new(
            self.store.clone(),
            self.queue.clone(),
            self.events.clone(),
            self.clock.clone(),
            self.config.scheduler.clone(),
        )
    }

    pub fn worker_pool(&self) -> WorkerPool {
        WorkerPool::new(
            self.store.clone(),
            self.queue.clone(),
            self.events.clone(),
            self.clock.clone(),
            self.registry.clone(),
            self.decider.clone(),
            self.config.worker.clone(),
        )
    }

    /// Spawn one scheduler and `worker.concurrency` workers.
    ///
    /// Fails fast when the store already holds live jobs of a type nothing
    /// here can handle.
    pub async fn start(&self) -> Result<AppHandle, CadenceError> {
        let live = self.store.list(&JobFilter::default()).await?;
        self.registry.ensure_registered(
            live.iter()
                .filter(|job| !job.status.is_terminal())
                .map(|job| &job.job_type),
        )?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = self.scheduler();
        let span = info_span!("scheduler", claimant = %scheduler.claimant());
        let mut joins = vec![tokio::spawn(
            scheduler.run(shutdown_rx.clone()).instrument(span),
        )];
        joins.extend(self.worker_pool().spawn(shutdown_rx));

        info!(
            workers = self.config.worker.concurrency,
            job_types = ?self.registry.registered_types(),
            "engine started"
        );
        Ok(AppHandle { shutdown_tx, joins })
    }
}

/// Running engine.
/// - `request_shutdown()` でループに停止を通知する（実行中の handler は最後まで走る）
/// - `shutdown_and_join()` で全タスクの終了を待てる
pub struct AppHandle {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl AppHandle {
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
        info!("engine stopped");
    }
}
