//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。各 trait は外部システム
//! （PostgreSQL, Redis, RabbitMQ, 監視基盤）へのインターフェースです。
//!
//! # 設計原則
//! - JobStore が source of truth（正本）
//! - TaskQueue は配送だけ（状態の権威は持たない）
//! - ハンドルはプロセス起動時に作って明示的に渡す（グローバル状態にしない）

pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod job_store;
pub mod task_queue;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_store::JobStore;
pub use self::task_queue::{AckToken, Delivery, QueueError, TaskQueue};
