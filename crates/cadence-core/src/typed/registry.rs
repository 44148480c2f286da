//! HandlerRegistry - Handler の登録と管理
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - Generic methods での登録と型安全性
//! - Arc による共有所有権

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::job_kind::JobKind;
use crate::domain::{CadenceError, JobType};

/// HandlerRegistry は型付き Handler を登録・管理
///
/// # 使用例
/// ```ignore
/// let mut registry = HandlerRegistry::new();
/// registry.register::<SendDigest, _>(SendDigestHandler)?;
///
/// let handler = registry.get(&JobType::new("mail.digest.send.v1"));
/// ```
///
/// 登録は起動時だけ行い、ワーカー起動後は `Arc<HandlerRegistry>` として
/// 読み取り専用で共有します。
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn DynHandler>>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("handler for job type '{0}' is already registered")]
    AlreadyRegistered(JobType),

    #[error("no handler registered for job type '{0}'")]
    NotRegistered(JobType),
}

impl From<RegistryError> for CadenceError {
    fn from(e: RegistryError) -> Self {
        CadenceError::Configuration(e.to_string())
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: JobKind, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.register_dyn(Arc::new(TypedHandler::new(handler)))
    }

    /// Register an already type-erased handler under its own `job_type()`.
    pub fn register_dyn(&mut self, handler: Arc<dyn DynHandler>) -> Result<(), RegistryError> {
        let job_type = JobType::new(handler.job_type());
        if self.handlers.contains_key(&job_type) {
            return Err(RegistryError::AlreadyRegistered(job_type));
        }
        self.handlers.insert(job_type, handler);
        Ok(())
    }

    pub fn get(&self, job_type: &JobType) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn contains(&self, job_type: &JobType) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Fail on the first type in `job_types` with no handler.
    pub fn ensure_registered<'a>(
        &self,
        job_types: impl IntoIterator<Item = &'a JobType>,
    ) -> Result<(), RegistryError> {
        for job_type in job_types {
            if !self.contains(job_type) {
                return Err(RegistryError::NotRegistered(job_type.clone()));
            }
        }
        Ok(())
    }

    /// Sorted, so startup logs are stable.
    pub fn registered_types(&self) -> Vec<JobType> {
        let mut types: Vec<JobType> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
