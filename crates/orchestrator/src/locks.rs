//! Per-source mutual exclusion within one process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use video_search_common::Source;

/// Keyed async mutex: one lock per source URL.
///
/// Entries whose lock nobody holds or waits on are pruned on the next acquire.
#[derive(Debug, Default)]
pub struct SourceLocks {
    table: Mutex<HashMap<Source, Arc<AsyncMutex<()>>>>,
}

impl SourceLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other task holds the lock for `source`
    pub async fn acquire(&self, source: &Source) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(table.entry(source.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of sources with a live lock
    #[must_use]
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_source_is_serialized() {
        let locks = Arc::new(SourceLocks::new());
        let source = Source::parse("https://example.com/v").unwrap();

        let guard = locks.acquire(&source).await;
        let waiter = {
            let locks = Arc::clone(&locks);
            let source = source.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&source).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_sources_do_not_contend() {
        let locks = SourceLocks::new();
        let a = Source::parse("https://example.com/a").unwrap();
        let b = Source::parse("https://example.com/b").unwrap();

        let _a = locks.acquire(&a).await;
        let acquired = tokio::time::timeout(Duration::from_millis(100), locks.acquire(&b)).await;
        assert!(acquired.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_released_locks_are_pruned() {
        let locks = SourceLocks::new();
        let a = Source::parse("https://example.com/a").unwrap();
        drop(locks.acquire(&a).await);
        assert!(locks.is_empty());
    }
}
