//! Per-tenant mutual exclusion for start/stop/teardown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use gymgate_core::TenantId;

/// Lazily created async mutex per tenant id.
///
/// Calls for different tenants never contend; calls for the same tenant run
/// one at a time for the lifetime of the returned guard.
#[derive(Debug, Default)]
pub struct TenantLocks {
    inner: Mutex<HashMap<TenantId, Arc<tokio::sync::Mutex<()>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, tenant: &TenantId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries only the map still references are idle.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(map.entry(tenant.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of tenants with a live lock handle.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_tenant_serializes() {
        let locks = TenantLocks::new();
        let tenant = TenantId::from("gymA");
        let _held = locks.acquire(&tenant).await;

        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&tenant)).await;
        assert!(second.is_err(), "second acquire must wait for the first guard");
    }

    #[tokio::test]
    async fn different_tenants_do_not_contend() {
        let locks = TenantLocks::new();
        let _a = locks.acquire(&TenantId::from("gymA")).await;
        let b = tokio::time::timeout(
            Duration::from_millis(50),
            locks.acquire(&TenantId::from("gymB")),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn released_guard_lets_next_caller_in() {
        let locks = TenantLocks::new();
        let tenant = TenantId::from("gymA");
        drop(locks.acquire(&tenant).await);
        let again = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&tenant)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = TenantLocks::new();
        drop(locks.acquire(&TenantId::from("gymA")).await);
        let _b = locks.acquire(&TenantId::from("gymB")).await;
        assert_eq!(locks.len(), 1);
    }
}
