//! Workflow error taxonomy
//!
//! Callers must be able to tell a duplicate (retry with a new token), a
//! contended lock (retry shortly) and a validation failure (do not retry)
//! apart, so each gets its own variant.

use thiserror::Error;
use uuid::Uuid;

use crate::coordination::CoordinationError;
use crate::documents::DocumentError;

use super::repository::StoreError;
use super::state_machine::TransitionError;

#[derive(Error, Debug)]
pub enum LoanError {
    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("duplicate request: idempotency key already used")]
    DuplicateRequest,

    #[error("loan {0} is locked by a concurrent investment, retry shortly")]
    LockContended(Uuid),

    #[error("{collaborator} unavailable: {message}")]
    CollaboratorUnavailable {
        collaborator: &'static str,
        message: String,
    },
}

impl LoanError {
    pub fn validation(message: impl Into<String>) -> Self {
        LoanError::ValidationFailed(message.into())
    }
}

impl From<StoreError> for LoanError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => LoanError::NotFound(what),
            StoreError::Conflict(message) => LoanError::Conflict(message),
            StoreError::Unavailable(message) => {
                LoanError::CollaboratorUnavailable {
                    collaborator: "entity store",
                    message,
                }
            }
        }
    }
}

impl From<CoordinationError> for LoanError {
    fn from(err: CoordinationError) -> Self {
        LoanError::CollaboratorUnavailable {
            collaborator: "coordination store",
            message: err.to_string(),
        }
    }
}

impl From<DocumentError> for LoanError {
    fn from(err: DocumentError) -> Self {
        LoanError::CollaboratorUnavailable {
            collaborator: "document store",
            message: err.to_string(),
        }
    }
}
