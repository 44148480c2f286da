//! Typed - 型付き Job API
//!
//! job_type 文字列の typo を型で排除し、Handler との対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `JobKind` trait, `Handler<T>` trait - 型安全
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure

pub mod handler;
pub mod job_kind;
pub mod registry;

pub use self::handler::{DynHandler, Handler, JobContext, TypedHandler};
pub use self::job_kind::JobKind;
pub use self::registry::{HandlerRegistry, RegistryError};
