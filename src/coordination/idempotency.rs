//! Idempotency markers for state-changing loan operations
//!
//! A marker is written only after an operation's durable writes succeeded.
//! The guarantee is at-most-once on a best-effort basis: if the process dies
//! between the writes and the marker, a retry can run again.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::{CoordinationError, CoordinationStore};

const KEY_PREFIX: &str = "idempotency:";

/// Default marker lifetime. Client retry windows are far shorter.
pub const DEFAULT_IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Approve,
    Invest,
    Disburse,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Approve => "approve",
            Operation::Invest => "invest",
            Operation::Disburse => "disburse",
        }
    }

    /// Value stored under a committed key
    pub fn marker(&self) -> &'static str {
        match self {
            Operation::Approve => "approved",
            Operation::Invest => "invested",
            Operation::Disburse => "disbursed",
        }
    }
}

/// Composite dedup key: `{operation}:{loan_id}[:{investor_id}]:{token}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyKey {
    operation: Operation,
    key: String,
}

impl IdempotencyKey {
    /// Approval keys carry no actor: one approval per loan and token, whoever sends it.
    pub fn approve(loan_id: Uuid, token: &str) -> Self {
        Self {
            operation: Operation::Approve,
            key: format!("{}:{}:{}", Operation::Approve.as_str(), loan_id, token),
        }
    }

    /// Investment keys include the investor so identical tokens from two investors don't collide.
    pub fn invest(loan_id: Uuid, investor_id: Uuid, token: &str) -> Self {
        Self {
            operation: Operation::Invest,
            key: format!(
                "{}:{}:{}:{}",
                Operation::Invest.as_str(),
                loan_id,
                investor_id,
                token
            ),
        }
    }

    pub fn disburse(loan_id: Uuid, token: &str) -> Self {
        Self {
            operation: Operation::Disburse,
            key: format!("{}:{}:{}", Operation::Disburse.as_str(), loan_id, token),
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    fn store_key(&self) -> String {
        format!("{}{}", KEY_PREFIX, self.key)
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn CoordinationStore>,
    ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn CoordinationStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Whether `key` was already committed (or is held by an in-flight request)
    pub async fn check(&self, key: &IdempotencyKey) -> Result<bool, CoordinationError> {
        self.store.exists(&key.store_key()).await
    }

    /// Record `key` as used. Never fails the caller; errors are logged.
    pub async fn commit(&self, key: &IdempotencyKey) {
        match self
            .store
            .set_if_absent(&key.store_key(), key.operation().marker(), self.ttl)
            .await
        {
            Ok(true) => {
                tracing::debug!(key = %key, "Idempotency marker committed");
            }
            Ok(false) => {
                tracing::warn!(key = %key, "Idempotency marker already present at commit");
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to commit idempotency marker");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCoordinationStore;

    #[test]
    fn test_key_layout() {
        let loan = Uuid::new_v4();
        let investor = Uuid::new_v4();

        assert_eq!(
            IdempotencyKey::approve(loan, "tok").as_str(),
            format!("approve:{}:tok", loan)
        );
        assert_eq!(
            IdempotencyKey::invest(loan, investor, "tok").as_str(),
            format!("invest:{}:{}:tok", loan, investor)
        );
        assert_eq!(
            IdempotencyKey::disburse(loan, "tok").as_str(),
            format!("disburse:{}:tok", loan)
        );
    }

    #[test]
    fn test_investors_with_same_token_do_not_collide() {
        let loan = Uuid::new_v4();
        let a = IdempotencyKey::invest(loan, Uuid::new_v4(), "retry-1");
        let b = IdempotencyKey::invest(loan, Uuid::new_v4(), "retry-1");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_check_then_commit() {
        let store = Arc::new(InMemoryCoordinationStore::new());
        let guard = IdempotencyGuard::new(store.clone(), DEFAULT_IDEMPOTENCY_TTL);
        let key = IdempotencyKey::approve(Uuid::new_v4(), "abc");

        assert!(!guard.check(&key).await.unwrap());
        guard.commit(&key).await;
        assert!(guard.check(&key).await.unwrap());

        let stored = store.raw_value(&format!("idempotency:{}", key)).await;
        assert_eq!(stored.as_deref(), Some("approved"));
    }

    #[tokio::test]
    async fn test_marker_expires_after_ttl() {
        let store = Arc::new(InMemoryCoordinationStore::new());
        let guard = IdempotencyGuard::new(store, Duration::from_millis(20));
        let key = IdempotencyKey::disburse(Uuid::new_v4(), "abc");

        guard.commit(&key).await;
        assert!(guard.check(&key).await.unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!guard.check(&key).await.unwrap());
    }
}
