//! Impls - ports のインメモリ実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryJobStore**: 正本。単一 Mutex で claim を直列化
//! - **InMemoryTaskQueue**: visibility timeout 付きの配送キュー
//! - **TracingEventSink / MemoryEventSink**: イベント出力
//!
//! # 本番用実装
//! 本番用の実装は別クレートに配置する想定です：
//! - PostgreSQL の JobStore（`FOR UPDATE SKIP LOCKED`）
//! - Redis / RabbitMQ の TaskQueue

pub mod event_sink;
pub mod memory_queue;
pub mod memory_store;

pub use self::event_sink::{MemoryEventSink, TracingEventSink};
pub use self::memory_queue::{InMemoryTaskQueue, QueueStats};
pub use self::memory_store::InMemoryJobStore;
