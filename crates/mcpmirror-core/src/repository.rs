//! Storage traits for snapshots and sync status
//!
//! These traits define the interface for persistence without specifying
//! the implementation (file-backed, in-memory, etc.)

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::registry::ServerRegistry;
use crate::sync::SyncStatus;

/// Result type for store operations
pub type StoreResult<T> = anyhow::Result<T>;

/// Durable store for one registry's snapshot and sync status.
///
/// `put` must be atomic: a concurrent `get` observes either the previous
/// snapshot or the new one, never a mix. Status writes must be durable
/// before the coordinator starts the next attempt.
///
/// Writes are suspension points for the sync pipeline: `put` and
/// `put_status` observe `cancel` and return an error without publishing
/// anything once it has fired.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Read the current snapshot, if one has ever been stored.
    async fn get(&self) -> StoreResult<Option<ServerRegistry>>;

    /// Atomically replace the snapshot.
    async fn put(
        &self,
        registry: &ServerRegistry,
        cancel: &CancellationToken,
    ) -> StoreResult<()>;

    /// Drop the snapshot and status.
    async fn delete(&self) -> StoreResult<()>;

    /// Read the persisted sync status.
    async fn get_status(&self) -> StoreResult<Option<SyncStatus>>;

    /// Durably record a status transition.
    async fn put_status(
        &self,
        status: &SyncStatus,
        cancel: &CancellationToken,
    ) -> StoreResult<()>;
}
