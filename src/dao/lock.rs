//! Named mutual exclusion shared by every orchestrator instance.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::{self, BoxFuture};
use uuid::Uuid;

use crate::dao::storage::StorageResult;

/// Lease-based lock keyed by name. A lease lapses after its TTL if never released.
pub trait DistributedLock: Send + Sync {
    /// Take the lease on `key` for `ttl`. Returns `false` when another holder owns it.
    fn try_acquire(&self, key: &str, ttl: Duration) -> BoxFuture<'static, StorageResult<bool>>;
    /// Give the lease back if this instance still holds it.
    fn release(&self, key: &str) -> BoxFuture<'static, StorageResult<()>>;
}

#[derive(Debug, Clone, Copy)]
struct Lease {
    holder: Uuid,
    expires_at: Instant,
}

/// Process-local lock. Handles created through [`InMemoryLock::shared_with`]
/// behave like separate instances contending on the same leases.
pub struct InMemoryLock {
    holder: Uuid,
    leases: Arc<DashMap<String, Lease>>,
}

impl Default for InMemoryLock {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLock {
    /// Lock with a fresh holder id and no leases.
    pub fn new() -> Self {
        Self {
            holder: Uuid::new_v4(),
            leases: Arc::new(DashMap::new()),
        }
    }

    /// New holder contending on the same leases as `other`.
    pub fn shared_with(other: &InMemoryLock) -> Self {
        Self {
            holder: Uuid::new_v4(),
            leases: Arc::clone(&other.leases),
        }
    }

    fn acquire_now(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let lease = Lease {
            holder: self.holder,
            expires_at: now + ttl,
        };
        match self.leases.entry(key.to_owned()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get();
                if current.holder == self.holder || current.expires_at <= now {
                    entry.insert(lease);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(lease);
                true
            }
        }
    }
}

impl DistributedLock for InMemoryLock {
    fn try_acquire(&self, key: &str, ttl: Duration) -> BoxFuture<'static, StorageResult<bool>> {
        Box::pin(future::ready(Ok(self.acquire_now(key, ttl))))
    }

    fn release(&self, key: &str) -> BoxFuture<'static, StorageResult<()>> {
        self.leases
            .remove_if(key, |_, lease| lease.holder == self.holder);
        Box::pin(future::ready(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn only_one_holder_at_a_time() {
        let first = InMemoryLock::new();
        let second = InMemoryLock::shared_with(&first);

        assert!(first.try_acquire("game-expiry", TTL).await.unwrap());
        assert!(!second.try_acquire("game-expiry", TTL).await.unwrap());
        assert!(second.try_acquire("token-cleanup", TTL).await.unwrap());

        second.release("game-expiry").await.unwrap();
        assert!(!second.try_acquire("game-expiry", TTL).await.unwrap());

        first.release("game-expiry").await.unwrap();
        assert!(second.try_acquire("game-expiry", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over() {
        let first = InMemoryLock::new();
        let second = InMemoryLock::shared_with(&first);

        assert!(
            first
                .try_acquire("game-expiry", Duration::from_millis(10))
                .await
                .unwrap()
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(second.try_acquire("game-expiry", TTL).await.unwrap());
        assert!(!first.try_acquire("game-expiry", TTL).await.unwrap());
    }
}
