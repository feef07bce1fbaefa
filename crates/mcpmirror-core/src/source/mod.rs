//! Polymorphic source handlers.
//!
//! A handler knows how to validate its configuration, fetch the raw
//! catalog, and (when it can do so cheaply) report a content hash without
//! a full fetch. Variants: git repository, local file, remote registry
//! API (which itself dispatches between the native and upstream formats
//! by probing).

pub mod api;
pub mod file;
pub mod git;
pub mod http;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::config::{SourceConfig, SourceType};
use crate::error::SourceError;
use crate::registry::{RegistryFormat, ServerRegistry};

/// Hard cap on any fetched document or response body.
pub const MAX_FETCH_BYTES: u64 = 100 * 1024 * 1024;

/// One successful fetch: the normalized registry, the content hash of the
/// bytes it was built from, and the wire format that was detected or
/// configured.
#[derive(Debug)]
pub struct FetchResult {
    pub registry: ServerRegistry,
    pub hash: String,
    pub format: RegistryFormat,
}

impl std::fmt::Debug for dyn SourceHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SourceHandler").finish()
    }
}

/// Capability set every source variant implements.
#[async_trait]
pub trait SourceHandler: Send + Sync {
    /// Check the configuration without touching the network.
    fn validate(&self) -> Result<(), SourceError>;

    /// Fetch and normalize the catalog. Observes `cancel` at every
    /// suspension point.
    async fn fetch(&self, cancel: &CancellationToken) -> Result<FetchResult, SourceError>;

    /// Content hash of the source right now, when the variant has a probe
    /// cheaper than a full fetch. `None` means the caller cannot
    /// short-circuit on hash equality and must rely on the sync interval.
    async fn current_hash(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, SourceError>;
}

/// Build the handler for a validated source configuration.
pub fn source_handler_for(config: &SourceConfig) -> Result<Box<dyn SourceHandler>, SourceError> {
    let kind = config
        .kind()
        .map_err(|e| SourceError::InvalidConfig(e.to_string()))?;
    let handler: Box<dyn SourceHandler> = match kind {
        SourceType::File => {
            let file = config
                .file
                .clone()
                .ok_or_else(|| SourceError::InvalidConfig("missing source.file".to_string()))?;
            Box::new(file::FileSource::new(file, config.format))
        }
        SourceType::Git => {
            let git = config
                .git
                .clone()
                .ok_or_else(|| SourceError::InvalidConfig("missing source.git".to_string()))?;
            Box::new(git::GitSource::new(git, config.format))
        }
        SourceType::Api => {
            let api = config
                .api
                .clone()
                .ok_or_else(|| SourceError::InvalidConfig("missing source.api".to_string()))?;
            Box::new(api::ApiSource::new(api, config.format))
        }
    };
    handler.validate()?;
    Ok(handler)
}

/// Hex SHA-256 of a byte slice.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex SHA-256 over a sequence of response bodies in fetch order.
pub fn content_hash_chunks<'a, I>(chunks: I) -> String
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    hex::encode(hasher.finalize())
}
