//! EventSink implementations.

use std::sync::{Arc, Mutex};

use tracing::info;

use crate::domain::DomainEvent;
use crate::ports::EventSink;

/// Writes every event as a structured `tracing` record under `cadence::events`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: DomainEvent) {
        match &event {
            DomainEvent::JobClaimed {
                job_id,
                job_type,
                latency,
            } => info!(
                target: "cadence::events",
                event = event.name(),
                job.id = %job_id,
                job.type = %job_type,
                latency_ms = latency.as_millis() as u64,
            ),
            DomainEvent::JobQueued { job_id, job_type } => info!(
                target: "cadence::events",
                event = event.name(),
                job.id = %job_id,
                job.type = %job_type,
            ),
            DomainEvent::JobStarted {
                job_id,
                job_type,
                attempt,
                latency,
            } => info!(
                target: "cadence::events",
                event = event.name(),
                job.id = %job_id,
                job.type = %job_type,
                attempt,
                latency_ms = latency.as_millis() as u64,
            ),
            DomainEvent::JobSucceeded {
                job_id,
                job_type,
                attempt,
                duration,
            } => info!(
                target: "cadence::events",
                event = event.name(),
                job.id = %job_id,
                job.type = %job_type,
                attempt,
                duration_ms = duration.as_millis() as u64,
            ),
            DomainEvent::JobFailed {
                job_id,
                job_type,
                attempt,
                duration,
                will_retry,
            } => info!(
                target: "cadence::events",
                event = event.name(),
                job.id = %job_id,
                job.type = %job_type,
                attempt,
                duration_ms = duration.as_millis() as u64,
                will_retry,
            ),
            DomainEvent::JobDeadLettered {
                job_id,
                job_type,
                attempts,
            } => info!(
                target: "cadence::events",
                event = event.name(),
                job.id = %job_id,
                job.type = %job_type,
                attempts,
            ),
            DomainEvent::LeasesReclaimed { count } => info!(
                target: "cadence::events",
                event = event.name(),
                count,
            ),
        }
    }
}

/// Keeps events in memory; tests read them back with `events()`.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Events whose `name()` equals `name`.
    pub fn named(&self, name: &str) -> Vec<DomainEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.name() == name)
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: DomainEvent) {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.push(event);
    }
}
