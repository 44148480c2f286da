//! Engine configuration.
//!
//! Plain serde structs with per-field defaults. Durations are milliseconds so
//! the same shape loads from TOML and from `CADENCE_*` environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{CadenceError, LeaseOwner, RetryPolicies};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub retry: RetryPolicies,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_ms: u64,
    pub batch_size: usize,
    pub lease_ttl_ms: u64,
    pub reclaim_interval_ms: u64,
    /// Generated as `scheduler-<ulid>` when unset.
    pub claimant_id: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            batch_size: 100,
            lease_ttl_ms: 30_000,
            reclaim_interval_ms: 5_000,
            claimant_id: None,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_millis(self.reclaim_interval_ms)
    }

    pub fn claimant(&self) -> LeaseOwner {
        match &self.claimant_id {
            Some(id) => LeaseOwner::new(id.clone()),
            None => LeaseOwner::generate("scheduler"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub visibility_timeout_ms: u64,
    pub lease_ttl_ms: u64,
    pub handler_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_jitter_ms: u64,
    pub requeue_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            visibility_timeout_ms: 30_000,
            lease_ttl_ms: 30_000,
            handler_timeout_ms: 25_000,
            poll_interval_ms: 200,
            poll_jitter_ms: 50,
            requeue_delay_ms: 100,
        }
    }
}

impl WorkerConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.visibility_timeout_ms)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }

    /// Never longer than the lease, so an attempt ends before its lease does.
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms.min(self.lease_ttl_ms))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_jitter(&self) -> Duration {
        Duration::from_millis(self.poll_jitter_ms)
    }

    pub fn requeue_delay(&self) -> Duration {
        Duration::from_millis(self.requeue_delay_ms)
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), CadenceError> {
        let fail = |msg: String| -> Result<(), CadenceError> {
            Err(CadenceError::Configuration(msg))
        };

        if self.scheduler.batch_size == 0 {
            return fail("scheduler.batch_size must be at least 1".into());
        }
        if self.scheduler.lease_ttl_ms == 0 {
            return fail("scheduler.lease_ttl_ms must be positive".into());
        }
        if self.scheduler.tick_interval_ms == 0 {
            return fail("scheduler.tick_interval_ms must be positive".into());
        }
        if self.worker.concurrency == 0 {
            return fail("worker.concurrency must be at least 1".into());
        }
        if self.worker.lease_ttl_ms == 0 {
            return fail("worker.lease_ttl_ms must be positive".into());
        }
        if self.worker.visibility_timeout_ms == 0 {
            return fail("worker.visibility_timeout_ms must be positive".into());
        }

        let policies = std::iter::once((None, &self.retry.default)).chain(
            self.retry
                .job_types
                .iter()
                .map(|(job_type, policy)| (Some(job_type), policy)),
        );
        for (job_type, policy) in policies {
            let scope = job_type.map_or_else(|| "default".to_string(), |t| t.to_string());
            if policy.base_delay_ms > policy.max_delay_ms {
                return fail(format!(
                    "retry.{scope}: base_delay_ms ({}) exceeds max_delay_ms ({})",
                    policy.base_delay_ms, policy.max_delay_ms
                ));
            }
            if policy.max_attempts == 0 {
                return fail(format!("retry.{scope}: max_attempts must be at least 1"));
            }
        }
        Ok(())
    }
}
