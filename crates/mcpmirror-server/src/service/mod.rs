//! Registry service: the read façade HTTP handlers consume.
//!
//! Each registry owns one `RegistryService`. The current snapshot lives
//! behind a single reference swap; readers grab the `Arc` once at entry
//! and use it for the whole request, so a concurrent sync never shows a
//! request two different snapshots.

mod cursor;
mod manager;
mod version;

pub use manager::{RegistryDescriptor, RegistryEntry, RegistryKind, RegistryManager};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use mcpmirror_core::registry::{Server, ServerRegistry};
use mcpmirror_core::repository::RegistryStore;
use mcpmirror_core::sync::{SyncPhase, SyncStatus};

/// Domain errors the HTTP boundary maps to status codes. Service code
/// never formats HTTP responses.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Mutation attempted against a read-only mirror.
    #[error("registry is not managed")]
    NotManaged,

    /// Mutation attempted against a config-owned registry.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotImplemented(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Parameters for `list_servers`. Parsed and validated at the HTTP
/// boundary; bounds are re-checked here so the service is safe on its
/// own.
#[derive(Debug, Default, Clone)]
pub struct ListQuery {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
    pub search: Option<String>,
    pub updated_since: Option<DateTime<Utc>>,
    pub version: Option<String>,
}

/// One page of results.
#[derive(Debug)]
pub struct ServerPage {
    pub servers: Vec<Server>,
    pub next_cursor: Option<String>,
    /// Total matches in this snapshot, across all pages.
    pub total: usize,
}

pub const DEFAULT_PAGE_LIMIT: usize = 100;
pub const MAX_PAGE_LIMIT: usize = 1_000;

struct SnapshotSlot {
    registry: Arc<ServerRegistry>,
    epoch: u64,
}

/// Read-only view over the current snapshot of one registry.
pub struct RegistryService {
    name: String,
    managed: bool,
    allow_empty: bool,
    snapshot: RwLock<Option<SnapshotSlot>>,
    status: RwLock<Option<SyncStatus>>,
    epoch: AtomicU64,
    store: Arc<dyn RegistryStore>,
}

impl RegistryService {
    pub fn new(
        name: impl Into<String>,
        managed: bool,
        allow_empty: bool,
        store: Arc<dyn RegistryStore>,
    ) -> Self {
        Self {
            name: name.into(),
            managed,
            allow_empty,
            snapshot: RwLock::new(None),
            status: RwLock::new(None),
            epoch: AtomicU64::new(0),
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_managed(&self) -> bool {
        self.managed
    }

    /// Current snapshot and its epoch, if one is installed. The caller
    /// keeps the `Arc` for the duration of its request.
    pub fn snapshot(&self) -> Option<(Arc<ServerRegistry>, u64)> {
        self.snapshot
            .read()
            .as_ref()
            .map(|slot| (slot.registry.clone(), slot.epoch))
    }

    /// Atomically replace the snapshot. Only the coordinator (or the
    /// publish path of a managed registry) calls this.
    pub fn install_snapshot(&self, registry: Arc<ServerRegistry>) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        *self.snapshot.write() = Some(SnapshotSlot { registry, epoch });
        epoch
    }

    pub fn set_status(&self, status: SyncStatus) {
        *self.status.write() = Some(status);
    }

    pub fn status(&self) -> Option<SyncStatus> {
        self.status.read().clone()
    }

    /// Ready iff a snapshot is installed, the last sync completed, and
    /// the snapshot is non-empty (unless policy allows empty).
    pub fn check_readiness(&self) -> Result<(), String> {
        let Some((registry, _)) = self.snapshot() else {
            return Err(format!("registry {:?} has no snapshot yet", self.name));
        };
        match self.status() {
            Some(status) if status.phase == SyncPhase::Complete => {}
            Some(status) => {
                return Err(format!(
                    "registry {:?} sync is {:?}: {}",
                    self.name, status.phase, status.message
                ))
            }
            None => return Err(format!("registry {:?} has never synced", self.name)),
        }
        if registry.is_empty() && !self.allow_empty {
            return Err(format!("registry {:?} is empty", self.name));
        }
        Ok(())
    }

    /// Paginated listing over the snapshot's insertion order.
    pub fn list_servers(&self, query: &ListQuery) -> Result<ServerPage, ServiceError> {
        let limit = match query.limit {
            None => DEFAULT_PAGE_LIMIT,
            Some(0) => {
                return Err(ServiceError::InvalidArgument(
                    "limit must be positive".to_string(),
                ))
            }
            Some(n) if n > MAX_PAGE_LIMIT => {
                return Err(ServiceError::InvalidArgument(format!(
                    "limit {n} exceeds maximum of {MAX_PAGE_LIMIT}"
                )))
            }
            Some(n) => n,
        };

        let Some((registry, epoch)) = self.snapshot() else {
            return Ok(ServerPage {
                servers: Vec::new(),
                next_cursor: None,
                total: 0,
            });
        };

        let offset = match &query.cursor {
            None => 0,
            Some(raw) => {
                let cursor = cursor::decode(raw)?;
                if cursor.epoch != epoch {
                    return Err(ServiceError::InvalidArgument(
                        "cursor refers to a superseded snapshot".to_string(),
                    ));
                }
                cursor.offset
            }
        };

        let matches: Vec<&Server> = registry
            .servers
            .iter()
            .filter(|s| self.matches_query(s, &registry, query))
            .collect();
        let total = matches.len();

        let servers: Vec<Server> = matches
            .iter()
            .skip(offset)
            .take(limit)
            .map(|s| (*s).clone())
            .collect();

        let next_offset = offset + servers.len();
        let next_cursor = (next_offset < total)
            .then(|| cursor::encode(epoch, next_offset));

        Ok(ServerPage {
            servers,
            next_cursor,
            total,
        })
    }

    fn matches_query(&self, server: &Server, registry: &ServerRegistry, query: &ListQuery) -> bool {
        if let Some(search) = &query.search {
            let needle = search.to_lowercase();
            let hit = server.name.to_lowercase().contains(&needle)
                || server.description.to_lowercase().contains(&needle);
            if !hit {
                return false;
            }
        }
        if let Some(since) = query.updated_since {
            let updated = server.last_updated().unwrap_or(registry.last_updated);
            if updated < since {
                return false;
            }
        }
        if let Some(version) = &query.version {
            if &server.version != version {
                return false;
            }
        }
        true
    }

    /// All versions of a server, by full or simple name.
    pub fn list_server_versions(&self, name: &str) -> Result<Vec<Server>, ServiceError> {
        let (registry, _) = self
            .snapshot()
            .ok_or_else(|| ServiceError::NotFound(format!("server {name:?} not found")))?;
        let matches: Vec<Server> = registry.get_all(name).into_iter().cloned().collect();
        if matches.is_empty() {
            return Err(ServiceError::NotFound(format!("server {name:?} not found")));
        }
        Ok(matches)
    }

    /// A single version; `latest` selects the highest under the
    /// semver-if-parseable-else-string rule.
    pub fn get_server_version(&self, name: &str, version: &str) -> Result<Server, ServiceError> {
        let versions = self.list_server_versions(name)?;
        if version == "latest" {
            return version::latest(&versions)
                .cloned()
                .ok_or_else(|| ServiceError::NotFound(format!("server {name:?} not found")));
        }
        versions
            .into_iter()
            .find(|s| s.version == version)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("server {name:?} has no version {version:?}"))
            })
    }

    /// Append a version to a managed registry.
    pub async fn publish_version(&self, server: Server) -> Result<(), ServiceError> {
        if !self.managed {
            return Err(ServiceError::NotManaged);
        }
        if server.name.trim().is_empty() {
            return Err(ServiceError::InvalidArgument(
                "server name must not be empty".to_string(),
            ));
        }
        if server.version.trim().is_empty() {
            return Err(ServiceError::InvalidArgument(
                "server version must not be empty".to_string(),
            ));
        }
        if !server.has_endpoint() {
            return Err(ServiceError::InvalidArgument(
                "server must declare packages or remotes".to_string(),
            ));
        }

        let current = self
            .snapshot()
            .map(|(r, _)| (*r).clone())
            .unwrap_or_else(ServerRegistry::empty);
        if current
            .servers
            .iter()
            .any(|s| s.name == server.name && s.version == server.version)
        {
            return Err(ServiceError::Conflict(format!(
                "version {:?} of {:?} already exists",
                server.version, server.name
            )));
        }

        info!(
            "[Registry] publishing {}@{} to {}",
            server.name, server.version, self.name
        );
        let mut next = current;
        next.servers.push(server);
        next.last_updated = Utc::now();
        self.commit_managed(next).await
    }

    /// Remove one version from a managed registry.
    pub async fn delete_version(&self, name: &str, version: &str) -> Result<(), ServiceError> {
        if !self.managed {
            return Err(ServiceError::NotManaged);
        }
        let mut next = self
            .snapshot()
            .map(|(r, _)| (*r).clone())
            .ok_or_else(|| ServiceError::NotFound(format!("server {name:?} not found")))?;
        let before = next.servers.len();
        next.servers
            .retain(|s| !(s.matches_name(name) && s.version == version));
        if next.servers.len() == before {
            return Err(ServiceError::NotFound(format!(
                "server {name:?} has no version {version:?}"
            )));
        }
        next.last_updated = Utc::now();
        info!(
            "[Registry] deleted {}@{} from {}",
            name, version, self.name
        );
        self.commit_managed(next).await
    }

    /// Persist and install a mutated managed snapshot, keeping the status
    /// record consistent with the new server count. Managed mutations are
    /// request-scoped and run to completion, so the store gets a token
    /// that never fires.
    async fn commit_managed(&self, next: ServerRegistry) -> Result<(), ServiceError> {
        let cancel = CancellationToken::new();
        self.store
            .put(&next, &cancel)
            .await
            .map_err(ServiceError::Internal)?;
        let count = next.len();
        self.install_snapshot(Arc::new(next));
        let now = Utc::now();
        let status = SyncStatus {
            phase: SyncPhase::Complete,
            last_attempt: now,
            last_success: Some(now),
            attempt_count: 0,
            last_hash: String::new(),
            server_count: count,
            message: format!("managed registry: {count} servers"),
            filter_hash: String::new(),
        };
        self.store
            .put_status(&status, &cancel)
            .await
            .map_err(ServiceError::Internal)?;
        self.set_status(status);
        Ok(())
    }
}
