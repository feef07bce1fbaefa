//! In-memory store.
//!
//! Snapshot replacement is a single reference swap behind a lock that is
//! never held across I/O, which gives `put` its atomicity for free. Used
//! by managed registries and tests. Writes still refuse a cancelled
//! token so the store honors the same contract as the file-backed one.

use anyhow::ensure;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use mcpmirror_core::registry::ServerRegistry;
use mcpmirror_core::repository::{RegistryStore, StoreResult};
use mcpmirror_core::sync::SyncStatus;

#[derive(Default)]
pub struct MemoryStore {
    registry: RwLock<Option<ServerRegistry>>,
    status: RwLock<Option<SyncStatus>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn get(&self) -> StoreResult<Option<ServerRegistry>> {
        Ok(self.registry.read().clone())
    }

    async fn put(
        &self,
        registry: &ServerRegistry,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        ensure!(!cancel.is_cancelled(), "registry write cancelled");
        *self.registry.write() = Some(registry.clone());
        Ok(())
    }

    async fn delete(&self) -> StoreResult<()> {
        *self.registry.write() = None;
        *self.status.write() = None;
        Ok(())
    }

    async fn get_status(&self) -> StoreResult<Option<SyncStatus>> {
        Ok(self.status.read().clone())
    }

    async fn put_status(
        &self,
        status: &SyncStatus,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        ensure!(!cancel.is_cancelled(), "status write cancelled");
        *self.status.write() = Some(status.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_round_trip() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        assert!(store.get().await.unwrap().is_none());

        let registry = ServerRegistry::empty();
        store.put(&registry, &cancel).await.unwrap();
        assert_eq!(store.get().await.unwrap().unwrap(), registry);

        let status = SyncStatus::syncing(None, Utc::now());
        store.put_status(&status, &cancel).await.unwrap();
        assert_eq!(store.get_status().await.unwrap().unwrap(), status);

        store.delete().await.unwrap();
        assert!(store.get().await.unwrap().is_none());
        assert!(store.get_status().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_writes_refused() {
        let store = MemoryStore::new();
        let cancelled = CancellationToken::new();
        cancelled.cancel();

        assert!(store
            .put(&ServerRegistry::empty(), &cancelled)
            .await
            .is_err());
        assert!(store
            .put_status(&SyncStatus::syncing(None, Utc::now()), &cancelled)
            .await
            .is_err());
        assert!(store.get().await.unwrap().is_none());
        assert!(store.get_status().await.unwrap().is_none());
    }
}
