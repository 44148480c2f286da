//! Handler trait - Job を実行する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<T>)
//! - Object-safe trait (DynHandler)
//! - Type erasure パターン (TypedHandler<T, H> → DynHandler)
//!
//! Handler は at-least-once で呼ばれます。副作用は `JobContext::dedup_key`
//! で冪等にしてください。

use std::marker::PhantomData;

use async_trait::async_trait;

use super::job_kind::JobKind;
use crate::domain::{HandlerError, HandlerResult, JobId, JobType};

/// Per-attempt context handed to a handler next to its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    pub job_id: JobId,
    pub job_type: JobType,
    /// 1-based attempt number within the current occurrence.
    pub attempt: u32,
    /// Stable across redeliveries and retries of one occurrence.
    pub dedup_key: String,
}

/// Handler は JobKind を実行する
///
/// # 使用例
/// ```ignore
/// struct SendDigestHandler;
///
/// #[async_trait]
/// impl Handler<SendDigest> for SendDigestHandler {
///     async fn handle(&self, job: SendDigest, ctx: &JobContext) -> HandlerResult {
///         mailer.send_once(ctx.dedup_key.as_str(), job.user_id).await
///             .map_err(|e| HandlerError::retryable(e.to_string()))
///     }
/// }
/// ```
///
/// `Handler<SendDigest>` は `SendDigest` しか受け取れないので、
/// job_type と payload 型の対応はコンパイル時に保証されます。
#[async_trait]
pub trait Handler<T: JobKind>: Send + Sync {
    async fn handle(&self, job: T, ctx: &JobContext) -> HandlerResult;
}

/// DynHandler は object-safe な Handler の抽象化
///
/// `HashMap<JobType, Arc<dyn DynHandler>>` に格納するための型消去層です。
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, payload: serde_json::Value, ctx: &JobContext) -> HandlerResult;

    fn job_type(&self) -> &str;
}

pub struct TypedHandler<T: JobKind, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<T>,
}

impl<T: JobKind, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: JobKind, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(&self, payload: serde_json::Value, ctx: &JobContext) -> HandlerResult {
        // a payload that does not decode will not decode on retry either
        let job: T = serde_json::from_value(payload)
            .map_err(|e| HandlerError::permanent(format!("payload decode: {e}")))?;
        self.handler.handle(job, ctx).await
    }

    fn job_type(&self) -> &str {
        T::TYPE
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::PingHandler;
    use super::*;
    use crate::typed::job_kind::fixtures::Ping;
    use serde_json::json;
    use ulid::Ulid;

    fn ctx() -> JobContext {
        JobContext {
            job_id: JobId::from_ulid(Ulid::new()),
            job_type: Ping::job_type(),
            attempt: 1,
            dedup_key: "k".to_string(),
        }
    }

    #[tokio::test]
    async fn typed_handler_decodes_and_runs() {
        let handler = TypedHandler::<Ping, _>::new(PingHandler);
        assert_eq!(handler.job_type(), "test.ping.v1");

        handler.handle_dyn(json!({ "value": 100 }), &ctx()).await.unwrap();

        let err = handler
            .handle_dyn(json!({ "value": -1 }), &ctx())
            .await
            .unwrap_err();
        assert_eq!(err, HandlerError::retryable("negative ping"));
    }

    #[tokio::test]
    async fn undecodable_payload_is_permanent() {
        let handler = TypedHandler::<Ping, _>::new(PingHandler);
        let err = handler
            .handle_dyn(json!({ "value": "nope" }), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Permanent(_)));
    }
}
