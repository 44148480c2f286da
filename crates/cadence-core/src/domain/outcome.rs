//! Outcome model: common result format for attempts.
//!
//! Handlers return `Result<(), HandlerError>`; this module maps that onto the
//! persisted `success | failure | timeout` classification.

use serde::{Deserialize, Serialize};

use super::errors::HandlerError;

/// What a handler returned for one attempt.
pub type HandlerResult = Result<(), HandlerError>;

/// Persisted classification of an attempt result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failure,
    Timeout,
}

impl OutcomeKind {
    pub fn of(result: &HandlerResult) -> Self {
        match result {
            Ok(()) => OutcomeKind::Success,
            Err(HandlerError::Timeout(_)) => OutcomeKind::Timeout,
            Err(_) => OutcomeKind::Failure,
        }
    }

    pub fn is_success(self) -> bool {
        self == OutcomeKind::Success
    }
}
