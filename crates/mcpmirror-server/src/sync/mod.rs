//! Sync lanes.
//!
//! Every synced registry gets one coordinator task (its lane). Lanes are
//! independent: registries sync in parallel, but within a lane at most
//! one attempt is ever in flight.

mod coordinator;

pub use coordinator::{SyncCoordinator, SyncHandle};

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use mcpmirror_core::config::RegistryConfig;
use mcpmirror_core::source::source_handler_for;
use mcpmirror_core::sync::manager::DEFAULT_MIN_RETRY_BACKOFF;
use mcpmirror_storage::{FileStore, MemoryStore};

use crate::service::{RegistryEntry, RegistryKind, RegistryService, ServiceError};

/// Builds registry entries: a synced registry gets a file-backed store
/// and a coordinator lane under the process cancellation token; a managed
/// registry gets an in-memory store and no lane.
pub struct SyncLauncher {
    data_dir: PathBuf,
    cancel: CancellationToken,
}

impl SyncLauncher {
    pub fn new(data_dir: PathBuf, cancel: CancellationToken) -> Self {
        Self { data_dir, cancel }
    }

    /// Validate a descriptor and start its sync lane.
    pub fn launch_synced(
        &self,
        config: RegistryConfig,
        config_owned: bool,
    ) -> Result<RegistryEntry, ServiceError> {
        config
            .validate()
            .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;
        let interval = config
            .sync_policy
            .interval_duration()
            .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;
        let handler = source_handler_for(&config.source)
            .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;

        let name = config.registry_name.clone();
        let store = Arc::new(FileStore::new(self.data_dir.join(&name)));
        let service = Arc::new(RegistryService::new(
            name.clone(),
            false,
            config.sync_policy.allow_empty,
            store.clone(),
        ));

        let sync = SyncCoordinator::spawn(
            name.clone(),
            service.clone(),
            store,
            handler,
            config.filter.clone(),
            interval,
            DEFAULT_MIN_RETRY_BACKOFF,
            self.cancel.child_token(),
        );

        Ok(RegistryEntry {
            name,
            kind: RegistryKind::Synced,
            config_owned,
            config: Some(config),
            service,
            sync: Some(sync),
        })
    }

    /// Create an empty managed registry backed by memory. Managed
    /// registries are mutated through publish/delete, not synced.
    pub fn create_managed(&self, name: &str) -> RegistryEntry {
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(RegistryService::new(name, true, true, store));
        service.install_snapshot(Arc::new(
            mcpmirror_core::registry::ServerRegistry::empty(),
        ));
        let now = chrono::Utc::now();
        service.set_status(mcpmirror_core::sync::SyncStatus {
            phase: mcpmirror_core::sync::SyncPhase::Complete,
            last_attempt: now,
            last_success: Some(now),
            attempt_count: 0,
            last_hash: String::new(),
            server_count: 0,
            message: "managed registry".to_string(),
            filter_hash: String::new(),
        });
        RegistryEntry {
            name: name.to_string(),
            kind: RegistryKind::Managed,
            config_owned: false,
            config: None,
            service,
            sync: None,
        }
    }
}
