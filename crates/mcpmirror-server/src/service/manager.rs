//! Multi-registry bookkeeping.
//!
//! A deployment hosts a named set of registries: config-owned synced
//! mirrors loaded at startup, plus registries created at runtime over the
//! extension API (synced or managed). The manager owns the name → entry
//! map; each entry owns its service and, for synced registries, its lane.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use mcpmirror_core::config::{RegistryConfig, SourceConfig};
use mcpmirror_core::sync::SyncStatus;

use super::{RegistryService, ServiceError};
use crate::sync::SyncHandle;

/// How a registry gets its contents.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    /// Mirrored from a source by a sync lane; read-only over HTTP.
    Synced,
    /// Mutated through publish/delete; no source.
    Managed,
}

/// One hosted registry.
pub struct RegistryEntry {
    pub name: String,
    pub kind: RegistryKind,
    /// Loaded from the config file; the extension API must not mutate or
    /// delete it.
    pub config_owned: bool,
    pub config: Option<RegistryConfig>,
    pub service: Arc<RegistryService>,
    pub sync: Option<SyncHandle>,
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("config_owned", &self.config_owned)
            .field("config", &self.config)
            .field("sync", &self.sync.is_some())
            .finish()
    }
}

impl RegistryEntry {
    /// Wire representation for the extension API.
    pub fn descriptor(&self) -> RegistryDescriptor {
        RegistryDescriptor {
            name: self.name.clone(),
            kind: self.kind,
            config_owned: self.config_owned,
            source: self.config.as_ref().map(|c| c.source.clone()),
            server_count: self
                .service
                .snapshot()
                .map(|(registry, _)| registry.len())
                .unwrap_or(0),
            sync_status: self.service.status(),
        }
    }
}

/// Serialized registry descriptor.
#[derive(Debug, Serialize)]
pub struct RegistryDescriptor {
    pub name: String,
    pub kind: RegistryKind,
    pub config_owned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceConfig>,
    pub server_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SyncStatus>,
}

/// Name → entry map plus the default registry the unprefixed read API
/// serves.
pub struct RegistryManager {
    registries: RwLock<HashMap<String, Arc<RegistryEntry>>>,
    default_name: String,
}

impl RegistryManager {
    pub fn new(default_name: impl Into<String>) -> Self {
        Self {
            registries: RwLock::new(HashMap::new()),
            default_name: default_name.into(),
        }
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn insert(&self, entry: RegistryEntry) -> Result<Arc<RegistryEntry>, ServiceError> {
        let mut registries = self.registries.write();
        if registries.contains_key(&entry.name) {
            return Err(ServiceError::Conflict(format!(
                "registry {:?} already exists",
                entry.name
            )));
        }
        info!("[Registry] hosting {:?} ({:?})", entry.name, entry.kind);
        let entry = Arc::new(entry);
        registries.insert(entry.name.clone(), entry.clone());
        Ok(entry)
    }

    /// Swap in a new entry for an existing name, stopping the old lane.
    pub fn replace(&self, entry: RegistryEntry) -> Result<Arc<RegistryEntry>, ServiceError> {
        let mut registries = self.registries.write();
        let old = registries.remove(&entry.name).ok_or_else(|| {
            ServiceError::NotFound(format!("registry {:?} not found", entry.name))
        })?;
        if let Some(sync) = &old.sync {
            sync.shutdown();
        }
        let entry = Arc::new(entry);
        registries.insert(entry.name.clone(), entry.clone());
        Ok(entry)
    }

    pub fn get(&self, name: &str) -> Option<Arc<RegistryEntry>> {
        self.registries.read().get(name).cloned()
    }

    pub fn default_entry(&self) -> Option<Arc<RegistryEntry>> {
        self.get(&self.default_name)
    }

    /// All entries, name-sorted for stable listings.
    pub fn list(&self) -> Vec<Arc<RegistryEntry>> {
        let mut entries: Vec<Arc<RegistryEntry>> =
            self.registries.read().values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Remove a runtime-created registry and stop its lane. Config-owned
    /// registries are refused.
    pub fn remove(&self, name: &str) -> Result<(), ServiceError> {
        let mut registries = self.registries.write();
        let entry = registries
            .get(name)
            .ok_or_else(|| ServiceError::NotFound(format!("registry {name:?} not found")))?;
        if entry.config_owned {
            return Err(ServiceError::Forbidden(format!(
                "registry {name:?} is owned by the server configuration"
            )));
        }
        let entry = registries.remove(name).expect("checked above");
        if let Some(sync) = &entry.sync {
            sync.shutdown();
        }
        info!("[Registry] removed {:?}", name);
        Ok(())
    }
}
