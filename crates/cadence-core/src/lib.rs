//! cadence-core
//!
//! 分散ジョブスケジューラのコア。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, job, schedule, state, retry, decision, errors, events）
//! - **ports**: 抽象化レイヤー（JobStore, TaskQueue, EventSink, Clock, IdGenerator）
//! - **impls**: ports のインメモリ実装
//! - **typed**: 型付き Job API（JobKind trait, Handler trait, HandlerRegistry）
//! - **app**: エンジン（AppBuilder, SchedulerLoop, WorkerPool, 設定）
//!
//! # 保証
//! - 1 つのジョブを同時に保持できるのは 1 つの lease だけ
//! - 実行は at-least-once。重複配送は JobStore の status / version で吸収する
//! - Handler の冪等性は `JobContext::dedup_key` で実現する

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod typed;

pub use self::app::{App, AppBuilder, AppHandle, EngineConfig};
pub use self::domain::{CadenceError, HandlerError, JobId, JobSpec, JobStatus, Schedule};
pub use self::typed::{Handler, JobContext, JobKind};
