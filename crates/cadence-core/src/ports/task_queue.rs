//! TaskQueue port - 配送キュー（Redis / RabbitMQ / InMemory）
//!
//! # 設計原則
//! - at-least-once 配送。重複配送は JobStore の status / version で吸収する
//! - dequeue した consumer だけが visibility timeout の間メッセージを持つ
//! - ack されなかったメッセージは timeout 後に再び見えるようになる

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use ulid::Ulid;

use crate::domain::{CadenceError, MessageId, TaskEnvelope};

/// Receipt for one delivery. A redelivery of the same message gets a new
/// receipt, which invalidates the old token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AckToken {
    pub message_id: MessageId,
    pub receipt: Ulid,
}

/// A message handed to one consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub envelope: TaskEnvelope,
    pub token: AckToken,
    /// 1 on first delivery.
    pub delivery_count: u32,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    /// Token already acked, nacked, or superseded by a redelivery.
    #[error("unknown or expired ack token for {0}")]
    UnknownToken(MessageId),
}

impl From<QueueError> for CadenceError {
    fn from(e: QueueError) -> Self {
        CadenceError::Transport(e.to_string())
    }
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, envelope: TaskEnvelope) -> Result<MessageId, QueueError>;

    /// Take one visible message, hiding it for `visibility_timeout`.
    /// `None` when nothing is visible right now.
    async fn dequeue(&self, visibility_timeout: Duration) -> Result<Option<Delivery>, QueueError>;

    async fn ack(&self, token: AckToken) -> Result<(), QueueError>;

    /// Give the message back, visible again after `requeue_delay`.
    async fn nack(&self, token: AckToken, requeue_delay: Duration) -> Result<(), QueueError>;
}
