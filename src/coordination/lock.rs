//! Per-loan advisory lock serializing investment additions

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::{CoordinationError, CoordinationStore};

/// Default lock lifetime, bounds how long a crashed holder blocks a loan
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct LoanLock {
    store: Arc<dyn CoordinationStore>,
    ttl: Duration,
}

impl LoanLock {
    pub fn new(store: Arc<dyn CoordinationStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn key(loan_id: Uuid) -> String {
        format!("lock:invest:{}", loan_id)
    }

    /// Try once to take the lock. `Ok(None)` means another holder has it; callers
    /// surface that instead of waiting.
    pub async fn acquire(&self, loan_id: Uuid) -> Result<Option<LoanLockGuard>, CoordinationError> {
        let key = Self::key(loan_id);
        if !self.store.set_if_absent(&key, "1", self.ttl).await? {
            tracing::debug!(loan_id = %loan_id, "Investment lock contended");
            return Ok(None);
        }

        tracing::debug!(loan_id = %loan_id, "Investment lock acquired");
        Ok(Some(LoanLockGuard {
            store: self.store.clone(),
            key,
            released: false,
        }))
    }
}

/// Held investment lock.
///
/// Call [`LoanLockGuard::release`] on the way out. A guard dropped without
/// it (early return, panic, cancelled task) schedules the delete on the
/// current tokio runtime; failing that, the TTL frees the loan.
pub struct LoanLockGuard {
    store: Arc<dyn CoordinationStore>,
    key: String,
    released: bool,
}

impl LoanLockGuard {
    pub async fn release(mut self) {
        if let Err(e) = self.store.delete(&self.key).await {
            tracing::warn!(key = %self.key, error = %e, "Failed to release investment lock, waiting for TTL");
        }
        self.released = true;
    }
}

impl Drop for LoanLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.delete(&key).await {
                        tracing::warn!(key = %key, error = %e, "Failed to release dropped investment lock");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(key = %key, "No runtime to release dropped investment lock, waiting for TTL");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCoordinationStore;

    fn lock() -> (Arc<InMemoryCoordinationStore>, LoanLock) {
        let store = Arc::new(InMemoryCoordinationStore::new());
        (store.clone(), LoanLock::new(store, DEFAULT_LOCK_TTL))
    }

    #[tokio::test]
    async fn test_second_acquire_is_contended() {
        let (_, lock) = lock();
        let loan = Uuid::new_v4();

        let guard = lock.acquire(loan).await.unwrap();
        assert!(guard.is_some());
        assert!(lock.acquire(loan).await.unwrap().is_none());

        guard.unwrap().release().await;
        assert!(lock.acquire(loan).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_locks_are_per_loan() {
        let (_, lock) = lock();

        let _a = lock.acquire(Uuid::new_v4()).await.unwrap().unwrap();
        let b = lock.acquire(Uuid::new_v4()).await.unwrap();
        assert!(b.is_some());
    }

    #[tokio::test]
    async fn test_dropped_guard_releases_lock() {
        let (store, lock) = lock();
        let loan = Uuid::new_v4();

        {
            let _guard = lock.acquire(loan).await.unwrap().unwrap();
            assert!(store.exists(&LoanLock::key(loan)).await.unwrap());
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!store.exists(&LoanLock::key(loan)).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_holder_releases_lock() {
        let (store, lock) = lock();
        let loan = Uuid::new_v4();

        let task_lock = lock.clone();
        let task = tokio::spawn(async move {
            let _guard = task_lock.acquire(loan).await.unwrap().unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.exists(&LoanLock::key(loan)).await.unwrap());

        task.abort();
        let _ = task.await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!store.exists(&LoanLock::key(loan)).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lock_can_be_taken_over() {
        let store = Arc::new(InMemoryCoordinationStore::new());
        let lock = LoanLock::new(store, Duration::from_millis(20));
        let loan = Uuid::new_v4();

        let stale = lock.acquire(loan).await.unwrap().unwrap();
        std::mem::forget(stale);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(lock.acquire(loan).await.unwrap().is_some());
    }
}
