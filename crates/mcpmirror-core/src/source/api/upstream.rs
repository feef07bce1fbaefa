//! Upstream MCP registry API dispatcher.
//!
//! Probe: `GET {endpoint}/openapi.yaml` must parse as YAML with
//! `info.version == "1.0.0"` and an `info.description` naming the
//! upstream project. Fetch: pages through `GET {endpoint}/v0/servers`,
//! which returns `ServerDetail` entries.

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::super::http::BoundedHttpClient;
use super::super::{content_hash_chunks, FetchResult};
use super::ApiDispatcher;
use crate::error::SourceError;
use crate::registry::{upstream, RegistryFormat};

/// Project URL the upstream registry's OpenAPI description must mention.
pub const UPSTREAM_PROJECT_URL: &str = "https://github.com/modelcontextprotocol/registry";

/// OpenAPI info version the upstream registry publishes.
const UPSTREAM_OPENAPI_VERSION: &str = "1.0.0";

const PAGE_LIMIT: usize = 100;
const MAX_PAGES: usize = 1_000;

#[derive(Debug, Deserialize)]
struct OpenApiDocument {
    info: Option<OpenApiInfo>,
}

#[derive(Debug, Deserialize)]
struct OpenApiInfo {
    version: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServersPage {
    #[serde(default)]
    servers: Vec<upstream::ServerDetail>,
    #[serde(default)]
    metadata: Option<PageMetadata>,
}

#[derive(Debug, Deserialize)]
struct PageMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

pub struct UpstreamApi {
    base_url: String,
    client: BoundedHttpClient,
}

impl UpstreamApi {
    pub(crate) fn new(base_url: String, client: BoundedHttpClient) -> Self {
        Self { base_url, client }
    }
}

#[async_trait]
impl ApiDispatcher for UpstreamApi {
    fn format(&self) -> RegistryFormat {
        RegistryFormat::Upstream
    }

    async fn probe(&self, cancel: &CancellationToken) -> Result<(), SourceError> {
        let body = self
            .client
            .get_bytes(&format!("{}/openapi.yaml", self.base_url), cancel)
            .await?;
        let doc: OpenApiDocument = serde_yaml::from_slice(&body)
            .map_err(|e| SourceError::Validation(format!("openapi.yaml: {e}")))?;
        let info = doc
            .info
            .ok_or_else(|| SourceError::Validation("openapi.yaml missing info".to_string()))?;

        if info.version.as_deref() != Some(UPSTREAM_OPENAPI_VERSION) {
            return Err(SourceError::Validation(format!(
                "openapi info.version {:?} is not {UPSTREAM_OPENAPI_VERSION:?}",
                info.version
            )));
        }
        let description = info.description.unwrap_or_default();
        if !description.contains(UPSTREAM_PROJECT_URL) {
            return Err(SourceError::Validation(format!(
                "openapi info.description does not mention {UPSTREAM_PROJECT_URL}"
            )));
        }
        Ok(())
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<FetchResult, SourceError> {
        let mut bodies: Vec<Vec<u8>> = Vec::new();
        let mut details: Vec<upstream::ServerDetail> = Vec::new();
        let mut cursor: Option<String> = None;

        for page_index in 0..MAX_PAGES {
            let mut url = format!("{}/v0/servers?limit={PAGE_LIMIT}", self.base_url);
            if let Some(cursor) = &cursor {
                url.push_str("&cursor=");
                url.push_str(cursor);
            }
            let (page, body): (ServersPage, _) = self.client.get_json(&url, cancel).await?;
            debug!(
                "[UpstreamApi] page {page_index}: {} entries from {}",
                page.servers.len(),
                self.base_url
            );
            bodies.push(body);
            details.extend(page.servers);

            cursor = page
                .metadata
                .and_then(|m| m.next_cursor)
                .filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        let hash = content_hash_chunks(bodies.iter().map(|b| b.as_slice()));
        let registry = upstream::convert(details)?;

        Ok(FetchResult {
            registry,
            hash,
            format: RegistryFormat::Upstream,
        })
    }
}
