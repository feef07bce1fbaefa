//! File-backed store.
//!
//! Layout: `<dir>/registry.json` and `<dir>/status.json`. Writes go to a
//! temp file in the same directory, are fsynced, then renamed over the
//! target; readers see either the old blob or the new one. Status writes
//! use the same path, which makes them durable before the next sync
//! attempt begins.
//!
//! Writes check the cancellation token before starting and again before
//! the rename that publishes the blob; a cancelled write leaves the
//! previous contents in place.

use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context as _, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use mcpmirror_core::registry::ServerRegistry;
use mcpmirror_core::repository::{RegistryStore, StoreResult};
use mcpmirror_core::sync::SyncStatus;

/// JSON-on-disk store for one registry.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store rooted at `dir`; the directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn registry_path(&self) -> PathBuf {
        self.dir.join("registry.json")
    }

    fn status_path(&self) -> PathBuf {
        self.dir.join("status.json")
    }

    async fn write_atomic(
        &self,
        path: &Path,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure!(
            !cancel.is_cancelled(),
            "write of {} cancelled",
            path.display()
        );

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create {}", self.dir.display()))?;

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;

        // fsync before the rename so the rename never exposes a torn file.
        let file = tokio::fs::File::open(&tmp)
            .await
            .with_context(|| format!("reopen {}", tmp.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("sync {}", tmp.display()))?;

        // Last observation point before the blob becomes visible.
        if cancel.is_cancelled() {
            let _ = tokio::fs::remove_file(&tmp).await;
            bail!("write of {} cancelled", path.display());
        }

        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        debug!("[FileStore] wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parse {}", path.display()))?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    async fn remove_if_present(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }
}

#[async_trait]
impl RegistryStore for FileStore {
    async fn get(&self) -> StoreResult<Option<ServerRegistry>> {
        self.read_json(&self.registry_path()).await
    }

    async fn put(
        &self,
        registry: &ServerRegistry,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(registry).context("serialize registry")?;
        self.write_atomic(&self.registry_path(), bytes, cancel).await
    }

    async fn delete(&self) -> StoreResult<()> {
        self.remove_if_present(&self.registry_path()).await?;
        self.remove_if_present(&self.status_path()).await
    }

    async fn get_status(&self) -> StoreResult<Option<SyncStatus>> {
        self.read_json(&self.status_path()).await
    }

    async fn put_status(
        &self,
        status: &SyncStatus,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(status).context("serialize status")?;
        self.write_atomic(&self.status_path(), bytes, cancel).await
    }
}
