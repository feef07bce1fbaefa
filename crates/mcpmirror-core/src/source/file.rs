//! Local file source.

use std::path::{Component, Path};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{content_hash, FetchResult, SourceHandler, MAX_FETCH_BYTES};
use crate::config::FileSourceConfig;
use crate::error::SourceError;
use crate::registry::{detect_document_format, parse_registry, RegistryFormat};

/// Reads the catalog from a path on the local filesystem.
pub struct FileSource {
    config: FileSourceConfig,
    format: Option<RegistryFormat>,
}

impl FileSource {
    pub fn new(config: FileSourceConfig, format: Option<RegistryFormat>) -> Self {
        Self { config, format }
    }

    async fn read(&self, cancel: &CancellationToken) -> Result<Vec<u8>, SourceError> {
        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SourceError::Cancelled),
            result = tokio::fs::read(&self.config.path) => result.map_err(|e| {
                SourceError::Io(format!("read {}: {e}", self.config.path))
            })?,
        };
        if bytes.len() as u64 > MAX_FETCH_BYTES {
            return Err(SourceError::ResponseTooLarge {
                size: bytes.len() as u64,
                limit: MAX_FETCH_BYTES,
            });
        }
        Ok(bytes)
    }
}

#[async_trait]
impl SourceHandler for FileSource {
    fn validate(&self) -> Result<(), SourceError> {
        if self.config.path.trim().is_empty() {
            return Err(SourceError::InvalidConfig(
                "file path must not be empty".to_string(),
            ));
        }
        if Path::new(&self.config.path)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(SourceError::InvalidConfig(format!(
                "file path {:?} contains '..' traversal segments",
                self.config.path
            )));
        }
        Ok(())
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<FetchResult, SourceError> {
        let bytes = self.read(cancel).await?;
        let format = match self.format {
            Some(format) => format,
            None => detect_document_format(&bytes)?,
        };
        debug!(
            "[FileSource] read {} bytes from {} ({})",
            bytes.len(),
            self.config.path,
            format.as_str()
        );
        let registry = parse_registry(&bytes, format)?;
        Ok(FetchResult {
            registry,
            hash: content_hash(&bytes),
            format,
        })
    }

    async fn current_hash(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, SourceError> {
        let bytes = self.read(cancel).await?;
        Ok(Some(content_hash(&bytes)))
    }
}
