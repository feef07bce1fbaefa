//! Remote registry API source.
//!
//! Two sub-variants speak to two different registry APIs: the native one
//! and the upstream MCP registry. When the config does not pin a format
//! the outer handler probes, native first, then upstream; the first probe
//! that validates wins and its dispatcher performs the fetch.

mod native;
mod upstream;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::http::{BoundedHttpClient, DEFAULT_HTTP_TIMEOUT};
use super::{FetchResult, SourceHandler};
use crate::config::ApiSourceConfig;
use crate::error::SourceError;
use crate::registry::RegistryFormat;

pub use native::NativeApi;
pub use upstream::UpstreamApi;

impl std::fmt::Debug for dyn ApiDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ApiDispatcher").field(&self.format()).finish()
    }
}

/// Format-specific API access: a cheap probe plus the full fetch.
#[async_trait]
pub(crate) trait ApiDispatcher: Send + Sync {
    /// The wire format this dispatcher produces.
    fn format(&self) -> RegistryFormat;

    /// Check whether the endpoint speaks this dispatcher's API.
    /// `Ok(())` accepts; an error carries the rejection reason.
    async fn probe(&self, cancel: &CancellationToken) -> Result<(), SourceError>;

    /// Fetch the whole catalog.
    async fn fetch(&self, cancel: &CancellationToken) -> Result<FetchResult, SourceError>;
}

/// Outer handler: probes and delegates.
pub struct ApiSource {
    config: ApiSourceConfig,
    format: Option<RegistryFormat>,
}

impl ApiSource {
    pub fn new(config: ApiSourceConfig, format: Option<RegistryFormat>) -> Self {
        Self { config, format }
    }

    fn dispatcher_for(&self, format: RegistryFormat) -> Result<Box<dyn ApiDispatcher>, SourceError> {
        let client = BoundedHttpClient::new(DEFAULT_HTTP_TIMEOUT)?;
        let base = self.config.base_url().to_string();
        Ok(match format {
            RegistryFormat::Toolhive => Box::new(NativeApi::new(base, client)),
            RegistryFormat::Upstream => Box::new(UpstreamApi::new(base, client)),
        })
    }

    /// Probe native first, then upstream; fixed order.
    async fn detect(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn ApiDispatcher>, SourceError> {
        if let Some(format) = self.format {
            debug!(
                "[ApiSource] format pinned to {} by configuration",
                format.as_str()
            );
            return self.dispatcher_for(format);
        }

        let native = self.dispatcher_for(RegistryFormat::Toolhive)?;
        let native_reason = match native.probe(cancel).await {
            Ok(()) => {
                info!("[ApiSource] {} detected as native", self.config.base_url());
                return Ok(native);
            }
            Err(SourceError::Cancelled) => return Err(SourceError::Cancelled),
            Err(e) => e,
        };

        let upstream = self.dispatcher_for(RegistryFormat::Upstream)?;
        let upstream_reason = match upstream.probe(cancel).await {
            Ok(()) => {
                info!(
                    "[ApiSource] {} detected as upstream",
                    self.config.base_url()
                );
                return Ok(upstream);
            }
            Err(SourceError::Cancelled) => return Err(SourceError::Cancelled),
            Err(e) => e,
        };

        Err(SourceError::FormatDetectionFailed(format!(
            "native probe: {native_reason}; upstream probe: {upstream_reason}"
        )))
    }
}

#[async_trait]
impl SourceHandler for ApiSource {
    fn validate(&self) -> Result<(), SourceError> {
        self.config
            .validate()
            .map_err(|e| SourceError::InvalidConfig(e.to_string()))
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<FetchResult, SourceError> {
        let dispatcher = self.detect(cancel).await?;
        dispatcher.fetch(cancel).await
    }

    /// The API has no change probe cheaper than the paged fetch itself.
    async fn current_hash(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Option<String>, SourceError> {
        Ok(None)
    }
}
