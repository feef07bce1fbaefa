//! Native registry API dispatcher.
//!
//! Probe: `GET {endpoint}/v0/info` must return 200 with a JSON body
//! carrying a `version` field and a non-negative `total_servers`.
//! Fetch: pages through `GET {endpoint}/v0/servers` and rebuilds the
//! canonical registry; the content hash covers every response body in
//! fetch order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::super::http::BoundedHttpClient;
use super::super::{content_hash_chunks, FetchResult};
use super::ApiDispatcher;
use crate::error::SourceError;
use crate::registry::{native, RegistryFormat, Server, ServerRegistry};

/// Page size requested from the remote.
const PAGE_LIMIT: usize = 100;

/// Guard against a remote that never terminates its cursor chain.
const MAX_PAGES: usize = 1_000;

#[derive(Debug, Deserialize)]
struct InfoResponse {
    version: Option<String>,
    total_servers: Option<i64>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ServersPage {
    #[serde(default)]
    servers: Vec<Server>,
    #[serde(default)]
    metadata: Option<PageMetadata>,
}

#[derive(Debug, Deserialize)]
struct PageMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

pub struct NativeApi {
    base_url: String,
    client: BoundedHttpClient,
}

impl NativeApi {
    pub(crate) fn new(base_url: String, client: BoundedHttpClient) -> Self {
        Self { base_url, client }
    }

    async fn info(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(InfoResponse, Vec<u8>), SourceError> {
        self.client
            .get_json(&format!("{}/v0/info", self.base_url), cancel)
            .await
    }
}

#[async_trait]
impl ApiDispatcher for NativeApi {
    fn format(&self) -> RegistryFormat {
        RegistryFormat::Toolhive
    }

    async fn probe(&self, cancel: &CancellationToken) -> Result<(), SourceError> {
        let (info, _) = self.info(cancel).await?;
        if info.version.is_none() {
            return Err(SourceError::Validation(
                "info response missing version".to_string(),
            ));
        }
        match info.total_servers {
            Some(n) if n >= 0 => Ok(()),
            Some(n) => Err(SourceError::Validation(format!(
                "info response has negative total_servers: {n}"
            ))),
            None => Err(SourceError::Validation(
                "info response missing total_servers".to_string(),
            )),
        }
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<FetchResult, SourceError> {
        let (info, info_body) = self.info(cancel).await?;
        let mut bodies: Vec<Vec<u8>> = vec![info_body];
        let mut servers: Vec<Server> = Vec::new();
        let mut cursor: Option<String> = None;

        for page_index in 0..MAX_PAGES {
            let mut url = format!("{}/v0/servers?limit={PAGE_LIMIT}", self.base_url);
            if let Some(cursor) = &cursor {
                url.push_str("&cursor=");
                url.push_str(cursor);
            }
            let (page, body): (ServersPage, _) = self.client.get_json(&url, cancel).await?;
            debug!(
                "[NativeApi] page {page_index}: {} servers from {}",
                page.servers.len(),
                self.base_url
            );
            bodies.push(body);

            for server in page.servers {
                if server.name.trim().is_empty() {
                    return Err(SourceError::Validation(
                        "remote returned a server with an empty name".to_string(),
                    ));
                }
                if server.has_endpoint() {
                    servers.push(server);
                } else {
                    tracing::warn!(
                        "[NativeApi] dropping {:?}: neither packages nor remotes",
                        server.name
                    );
                }
            }

            cursor = page.metadata.and_then(|m| m.next_cursor).filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        let servers = native::dedup_simple_names(servers);
        let hash = content_hash_chunks(bodies.iter().map(|b| b.as_slice()));
        let mut registry =
            ServerRegistry::new(info.last_updated.unwrap_or_else(Utc::now), servers);
        if let Some(version) = info.version {
            registry.schema_version = version;
        }

        Ok(FetchResult {
            registry,
            hash,
            format: RegistryFormat::Toolhive,
        })
    }
}
