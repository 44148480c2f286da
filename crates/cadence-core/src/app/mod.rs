//! App - アプリケーション層
//!
//! ports を組み合わせてエンジンを組み立てます。
//!
//! # 主要コンポーネント
//! - **AppBuilder / App**: ワイヤリングと Job API
//! - **SchedulerLoop**: due ジョブの claim → enqueue、lease 回収
//! - **WorkerPool**: dequeue → 実行 → 結果の記録
//! - **EngineConfig**: 設定値
//! - **StatusCounts**: 状態ごとの件数

pub mod backoff;
pub mod builder;
pub mod config;
pub mod scheduler_loop;
pub mod status;
pub mod worker_loop;

pub use self::backoff::InfraBackoff;
pub use self::builder::{App, AppBuilder, AppHandle, BuildError};
pub use self::config::{EngineConfig, SchedulerConfig, WorkerConfig};
pub use self::scheduler_loop::{SchedulerLoop, TickReport};
pub use self::status::StatusCounts;
pub use self::worker_loop::{Processed, WorkerPool};
