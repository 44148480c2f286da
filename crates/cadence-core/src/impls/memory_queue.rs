//! In-memory TaskQueue with visibility timeouts.
//!
//! Messages stay in `messages` until acked. Visibility is tracked with a
//! min-heap of `(visible_at, seq)` entries; entries left behind by a later
//! dequeue/nack of the same message are skipped lazily.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use ulid::Ulid;

use crate::domain::{MessageId, TaskEnvelope, add_duration};
use crate::ports::{
    AckToken, Clock, Delivery, IdGenerator, QueueError, SystemClock, TaskQueue, UlidGenerator,
};

struct StoredMessage {
    envelope: TaskEnvelope,
    visible_at: DateTime<Utc>,
    /// Heap entry that currently represents this message.
    seq: u64,
    /// Receipt of the outstanding delivery, if any.
    receipt: Option<Ulid>,
    delivery_count: u32,
}

#[derive(Default)]
struct QueueState {
    messages: HashMap<MessageId, StoredMessage>,
    visibility: BinaryHeap<Reverse<(DateTime<Utc>, u64, MessageId)>>,
    next_seq: u64,
}

impl QueueState {
    fn schedule(&mut self, id: MessageId, visible_at: DateTime<Utc>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.visibility.push(Reverse((visible_at, seq, id)));
        seq
    }

    fn outstanding(&mut self, token: AckToken) -> Result<&mut StoredMessage, QueueError> {
        self.messages
            .get_mut(&token.message_id)
            .filter(|m| m.receipt == Some(token.receipt))
            .ok_or(QueueError::UnknownToken(token.message_id))
    }
}

/// Point-in-time queue depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Visible now or waiting out a requeue delay.
    pub waiting: usize,
    /// Handed to a consumer and not yet acked.
    pub in_flight: usize,
}

pub struct InMemoryTaskQueue {
    state: Arc<Mutex<QueueState>>,
    clock: Arc<dyn Clock>,
    ids: Box<dyn IdGenerator>,
    unavailable: AtomicBool,
}

impl InMemoryTaskQueue {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            clock,
            ids: Box::new(UlidGenerator::new(SystemClock)),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Fault injection: while set, every operation fails with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn stats(&self) -> QueueStats {
        let now = self.clock.now();
        let state = self.state.lock().await;
        let in_flight = state
            .messages
            .values()
            .filter(|m| m.receipt.is_some() && m.visible_at > now)
            .count();
        QueueStats {
            waiting: state.messages.len() - in_flight,
            in_flight,
        }
    }

    fn check_available(&self) -> Result<(), QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("in-memory queue offline".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, envelope: TaskEnvelope) -> Result<MessageId, QueueError> {
        self.check_available()?;
        let now = self.clock.now();
        let id = self.ids.generate_message_id();

        let mut state = self.state.lock().await;
        let seq = state.schedule(id, now);
        state.messages.insert(
            id,
            StoredMessage {
                envelope,
                visible_at: now,
                seq,
                receipt: None,
                delivery_count: 0,
            },
        );
        Ok(id)
    }

    async fn dequeue(&self, visibility_timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        while let Some(Reverse((visible_at, seq, id))) = state.visibility.peek().copied() {
            if visible_at > now {
                break;
            }
            state.visibility.pop();

            let live = state
                .messages
                .get(&id)
                .is_some_and(|m| m.seq == seq && m.visible_at == visible_at);
            if !live {
                continue;
            }

            let hidden_until = add_duration(now, visibility_timeout);
            let new_seq = state.schedule(id, hidden_until);
            let receipt = Ulid::new();
            let Some(message) = state.messages.get_mut(&id) else {
                continue;
            };
            message.visible_at = hidden_until;
            message.seq = new_seq;
            message.receipt = Some(receipt);
            message.delivery_count += 1;

            return Ok(Some(Delivery {
                envelope: message.envelope.clone(),
                token: AckToken {
                    message_id: id,
                    receipt,
                },
                delivery_count: message.delivery_count,
            }));
        }
        Ok(None)
    }

    async fn ack(&self, token: AckToken) -> Result<(), QueueError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.outstanding(token)?;
        state.messages.remove(&token.message_id);
        Ok(())
    }

    async fn nack(&self, token: AckToken, requeue_delay: Duration) -> Result<(), QueueError> {
        self.check_available()?;
        let visible_at = add_duration(self.clock.now(), requeue_delay);
        let mut state = self.state.lock().await;
        state.outstanding(token)?;
        let seq = state.schedule(token.message_id, visible_at);
        let message = state.outstanding(token)?;
        message.visible_at = visible_at;
        message.seq = seq;
        message.receipt = None;
        Ok(())
    }
}
