//! Key-value coordination store
//!
//! Shared by every service instance: idempotency markers, per-loan
//! investment locks and the best-effort loan cache all live here, which keeps
//! the workflow itself free of in-process coordination state.

mod idempotency;
mod lock;
mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::idempotency::{
    IdempotencyGuard, IdempotencyKey, Operation, DEFAULT_IDEMPOTENCY_TTL,
};
pub use self::lock::{LoanLock, LoanLockGuard, DEFAULT_LOCK_TTL};
pub use self::redis::RedisCoordinationStore;

/// Coordination store errors
#[derive(Error, Debug)]
pub enum CoordinationError {
    #[error("Failed to connect to coordination store: {0}")]
    ConnectionError(String),

    #[error("Coordination command failed: {0}")]
    CommandError(String),
}

impl From<::redis::RedisError> for CoordinationError {
    fn from(err: ::redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            CoordinationError::ConnectionError(err.to_string())
        } else {
            CoordinationError::CommandError(err.to_string())
        }
    }
}

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Atomically write `value` unless `key` is already present. Returns whether the write happened.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError>;

    async fn exists(&self, key: &str) -> Result<bool, CoordinationError>;

    async fn delete(&self, key: &str) -> Result<(), CoordinationError>;

    /// Unconditional write with expiry, no consistency guarantees
    async fn set_cache(&self, key: &str, value: &str, ttl: Duration)
        -> Result<(), CoordinationError>;

    async fn get_cache(&self, key: &str) -> Result<Option<String>, CoordinationError>;

    /// Connectivity check for the health endpoint
    async fn ping(&self) -> Result<(), CoordinationError> {
        Ok(())
    }
}
