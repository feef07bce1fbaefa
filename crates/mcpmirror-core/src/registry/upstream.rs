//! Upstream MCP registry list format.
//!
//! A document is a JSON array of `ServerDetail` objects; API sources page
//! through `{"servers": [...], "metadata": {"next_cursor": ...}}`
//! envelopes carrying the same objects. Each detail nests the server
//! record under `server` and carries publisher extensions under
//! `x-publisher`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::types::{
    EnvVar, HeaderSpec, Package, RemoteEndpoint, Server, ServerMeta, ServerRegistry, Transport,
};
use crate::error::SourceError;

/// One upstream catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDetail {
    pub server: ServerBlock,

    #[serde(
        default,
        rename = "x-publisher",
        skip_serializing_if = "Option::is_none"
    )]
    pub publisher: Option<PublisherExtension>,
}

/// The nested server record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerBlock {
    pub name: String,

    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_detail: Option<VersionDetail>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<UpstreamPackage>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remotes: Vec<UpstreamRemote>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDetail {
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamPackage {
    #[serde(alias = "registry_name")]
    pub registry_type: String,

    #[serde(alias = "name")]
    pub identifier: String,

    #[serde(default)]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamRemote {
    #[serde(rename = "type")]
    pub transport_type: Transport,

    pub url: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportRef {
    #[serde(rename = "type")]
    pub transport_type: Transport,
}

/// Publisher extension block: tier/status/transport/tools plus free-form
/// extras the mirror carries through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublisherExtension {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<Transport>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_vars: Vec<EnvVar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_config: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Value>,
}

/// Parse an upstream list document into the canonical registry.
pub fn parse(bytes: &[u8]) -> Result<ServerRegistry, SourceError> {
    let details: Vec<ServerDetail> = serde_json::from_slice(bytes)
        .map_err(|e| SourceError::Validation(format!("upstream document: {e}")))?;
    convert(details)
}

/// Normalize a list of upstream entries.
pub fn convert(details: Vec<ServerDetail>) -> Result<ServerRegistry, SourceError> {
    let mut servers = Vec::with_capacity(details.len());
    for detail in details {
        match convert_detail(detail)? {
            Some(server) => servers.push(server),
            None => {}
        }
    }
    let servers = super::native::dedup_simple_names(servers);
    Ok(ServerRegistry::new(Utc::now(), servers))
}

fn convert_detail(detail: ServerDetail) -> Result<Option<Server>, SourceError> {
    let block = detail.server;
    if block.name.trim().is_empty() {
        return Err(SourceError::Validation(
            "upstream entry with empty name".to_string(),
        ));
    }
    if block.description.trim().is_empty() {
        return Err(SourceError::Validation(format!(
            "upstream entry {:?} has an empty description",
            block.name
        )));
    }
    if block.packages.is_empty() && block.remotes.is_empty() {
        warn!(
            "[Upstream] dropping {:?}: neither packages nor remotes",
            block.name
        );
        return Ok(None);
    }

    let version = block
        .version_detail
        .map(|v| v.version)
        .or(block.version)
        .unwrap_or_else(|| "latest".to_string());

    let packages: Vec<Package> = block
        .packages
        .into_iter()
        .map(|p| Package {
            registry_type: p.registry_type,
            identifier: p.identifier,
            version: if p.version.is_empty() {
                version.clone()
            } else {
                p.version
            },
            transport: p.transport.map(|t| t.transport_type).unwrap_or_default(),
        })
        .collect();

    let remotes: Vec<RemoteEndpoint> = block
        .remotes
        .into_iter()
        .map(|r| RemoteEndpoint {
            url: r.url,
            transport: r.transport_type,
            headers: r.headers,
        })
        .collect();

    let publisher = detail.publisher.unwrap_or_default();
    let meta = ServerMeta {
        tier: publisher.tier,
        status: publisher.status,
        transport: publisher.transport,
        tools: publisher.tools,
        env_vars: publisher.env_vars,
        permissions: publisher.permissions,
        repository_url: block.repository.map(|r| r.url),
        oauth_config: publisher.oauth_config,
        provenance: publisher.provenance,
        last_updated: None,
    };

    Ok(Some(Server {
        name: block.name,
        description: block.description,
        tags: vec![],
        version,
        packages,
        remotes,
        meta: (!meta.is_empty()).then_some(meta),
    }))
}

/// Shape a canonical server as an upstream `ServerDetail` for responses
/// negotiated with `?format=upstream`.
pub fn to_server_detail(server: &Server) -> ServerDetail {
    let meta = server.meta.clone().unwrap_or_default();
    let publisher = PublisherExtension {
        tier: meta.tier,
        status: meta.status,
        transport: meta.transport,
        tools: meta.tools,
        env_vars: meta.env_vars,
        permissions: meta.permissions,
        oauth_config: meta.oauth_config,
        provenance: meta.provenance,
    };
    let has_publisher = serde_json::to_value(&publisher)
        .map(|v| v.as_object().map(|o| !o.is_empty()).unwrap_or(false))
        .unwrap_or(false);

    ServerDetail {
        server: ServerBlock {
            name: server.name.clone(),
            description: server.description.clone(),
            version: None,
            version_detail: Some(VersionDetail {
                version: server.version.clone(),
            }),
            packages: server
                .packages
                .iter()
                .map(|p| UpstreamPackage {
                    registry_type: p.registry_type.clone(),
                    identifier: p.identifier.clone(),
                    version: p.version.clone(),
                    transport: Some(TransportRef {
                        transport_type: p.transport,
                    }),
                })
                .collect(),
            remotes: server
                .remotes
                .iter()
                .map(|r| UpstreamRemote {
                    transport_type: r.transport,
                    url: r.url.clone(),
                    headers: r.headers.clone(),
                })
                .collect(),
            repository: server
                .meta
                .as_ref()
                .and_then(|m| m.repository_url.clone())
                .map(|url| RepositoryRef { url, source: None }),
        },
        publisher: has_publisher.then_some(publisher),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY: &str = r#"[{
        "server": {
            "name": "io.github.acme/fetcher",
            "description": "Fetches things",
            "version_detail": {"version": "2.1.0"},
            "packages": [{"registry_type": "npm", "identifier": "@acme/fetcher", "version": "2.1.0", "transport": {"type": "stdio"}}]
        },
        "x-publisher": {"tier": "community", "status": "active", "tools": ["fetch"]}
    }]"#;

    #[test]
    fn test_parse_server_detail_list() {
        let registry = parse(ENTRY.as_bytes()).unwrap();
        assert_eq!(registry.servers.len(), 1);
        let server = &registry.servers[0];
        assert_eq!(server.name, "io.github.acme/fetcher");
        assert_eq!(server.version, "2.1.0");
        assert_eq!(server.packages[0].registry_type, "npm");
        let meta = server.meta.as_ref().unwrap();
        assert_eq!(meta.tier.as_deref(), Some("community"));
        assert_eq!(meta.tools, vec!["fetch"]);
    }

    #[test]
    fn test_empty_description_rejected() {
        let raw = br#"[{"server": {"name": "a", "description": "", "remotes": [{"type": "sse", "url": "https://x"}]}}]"#;
        assert!(matches!(
            parse(raw).unwrap_err(),
            SourceError::Validation(_)
        ));
    }

    #[test]
    fn test_entry_without_endpoint_dropped() {
        let raw = br#"[{"server": {"name": "a", "description": "desc"}}]"#;
        let registry = parse(raw).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remote_entry() {
        let raw = br#"[{"server": {"name": "hosted", "description": "d", "remotes": [{"type": "streamable-http", "url": "https://mcp.example.com"}]}}]"#;
        let registry = parse(raw).unwrap();
        let server = &registry.servers[0];
        assert_eq!(server.remotes[0].transport, Transport::StreamableHttp);
    }

    #[test]
    fn test_round_trip_to_server_detail() {
        let registry = parse(ENTRY.as_bytes()).unwrap();
        let detail = to_server_detail(&registry.servers[0]);
        assert_eq!(detail.server.name, "io.github.acme/fetcher");
        assert_eq!(
            detail.server.version_detail.as_ref().unwrap().version,
            "2.1.0"
        );
        let publisher = detail.publisher.unwrap();
        assert_eq!(publisher.tier.as_deref(), Some("community"));
    }

    #[test]
    fn test_registry_name_alias_accepted() {
        let raw = br#"[{"server": {"name": "a", "description": "d", "packages": [{"registry_name": "pypi", "name": "acme-a", "version": "0.1.0"}]}}]"#;
        let registry = parse(raw).unwrap();
        assert_eq!(registry.servers[0].packages[0].registry_type, "pypi");
        assert_eq!(registry.servers[0].packages[0].identifier, "acme-a");
    }
}
