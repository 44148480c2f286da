//! EventSink port - イベント記録の抽象化
//!
//! - TracingEventSink: tracing へ出力（デフォルト）
//! - MemoryEventSink: テスト用に溜め込む
//! - 将来: Prometheus などへの送信

use crate::domain::DomainEvent;

/// Fire-and-forget: emission never fails the caller.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}
