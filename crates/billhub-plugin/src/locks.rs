//! Per-plugin-name operation locks.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes operations on the same plugin name while letting operations
/// on different names run concurrently. Entries for removed plugins are
/// dropped with [`NameLocks::evict`].
#[derive(Debug, Default)]
pub(crate) struct NameLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl NameLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `name`.
    pub(crate) async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the map shard is not held across the await.
        let lock = self
            .locks
            .entry(name.to_string())
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Forget the lock for `name` unless a task holds or awaits it.
    pub(crate) fn evict(&self, name: &str) {
        self.locks
            .remove_if(name, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_name_is_exclusive() {
        let locks = NameLocks::new();
        let _held = locks.lock("ledger").await;
        let second = tokio::time::timeout(Duration::from_millis(20), locks.lock("ledger")).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_different_names_are_independent() {
        let locks = NameLocks::new();
        let _a = locks.lock("ledger").await;
        let b = tokio::time::timeout(Duration::from_millis(20), locks.lock("reports")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_evict_keeps_locks_in_use() {
        let locks = NameLocks::new();
        let held = locks.lock("ledger").await;
        drop(locks.lock("reports").await);
        assert_eq!(locks.len(), 2);

        locks.evict("ledger");
        locks.evict("reports");
        assert_eq!(locks.len(), 1);

        drop(held);
        locks.evict("ledger");
        assert_eq!(locks.len(), 0);
    }
}
