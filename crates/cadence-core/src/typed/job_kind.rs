//! JobKind trait - job_type と payload 型の対応付け
//!
//! # 学習ポイント
//! - Associated Constants (`const TYPE`)
//! - Trait bounds の組み合わせ (Serialize + DeserializeOwned + Send + Sync + 'static)

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{JobSpec, JobType, Schedule};

/// JobKind は job_type と payload 型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct SendDigest {
///     user_id: u64,
/// }
///
/// impl JobKind for SendDigest {
///     const TYPE: &'static str = "mail.digest.send.v1";
/// }
/// ```
///
/// # 命名規約
/// - `{namespace}.{domain}.{action}.v{major}`
/// - payload の互換性を壊す変更では major を上げて別 type として登録する
pub trait JobKind: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE: &'static str;

    fn job_type() -> JobType {
        JobType::new(Self::TYPE)
    }

    /// Build a `JobSpec` carrying `self` as payload.
    fn to_spec(&self, schedule: Schedule) -> Result<JobSpec, serde_json::Error> {
        Ok(JobSpec::new(Self::job_type(), schedule).with_payload(serde_json::to_value(self)?))
    }
}
