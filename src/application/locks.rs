use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-account write locks.
///
/// Holding the guard for an account makes the caller the only writer of that
/// account inside this process. Accounts never share a lock, so writes to
/// different accounts proceed in parallel.
#[derive(Default)]
pub struct AccountLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Idle entries are swept once the registry grows past this size.
const SWEEP_THRESHOLD: usize = 1024;

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to `account_id`.
    pub async fn acquire(&self, account_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if locks.len() >= SWEEP_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks
                .entry(account_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of accounts with a registered lock.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_account_is_serialized() {
        let locks = Arc::new(AccountLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("acct").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn different_accounts_do_not_block() {
        let locks = AccountLocks::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
