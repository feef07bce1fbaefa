//! Native (toolhive) registry document.
//!
//! A single JSON object keyed by server name:
//!
//! ```json
//! {
//!   "version": "1.0.0",
//!   "last_updated": "2025-01-01T00:00:00Z",
//!   "servers": { "name": { "image": "...", ... } },
//!   "remote_servers": { "name": { "url": "...", ... } },
//!   "groups": []
//! }
//! ```
//!
//! Container entries become `packages` with registry type `oci`; remote
//! entries become `remotes`. Map order is preserved (serde_json's
//! `preserve_order`), so discovery order equals document order.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::types::{EnvVar, HeaderSpec, Package, RemoteEndpoint, Server, ServerMeta, ServerRegistry, Transport};
use crate::error::SourceError;

/// Raw native document as it appears on the wire.
#[derive(Debug, Deserialize)]
pub struct NativeDocument {
    #[serde(default = "default_doc_version")]
    pub version: String,

    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,

    /// Container servers, keyed by name. Must be an object; may be empty.
    #[serde(default)]
    pub servers: serde_json::Map<String, Value>,

    /// Remote servers, keyed by name. Must be an object; may be empty.
    #[serde(default)]
    pub remote_servers: serde_json::Map<String, Value>,

    #[serde(default)]
    pub groups: Vec<Value>,
}

fn default_doc_version() -> String {
    "1.0.0".to_string()
}

/// A container server entry.
#[derive(Debug, Deserialize)]
pub struct NativeServerEntry {
    pub image: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub tier: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub transport: Option<Transport>,

    #[serde(default)]
    pub tools: Vec<String>,

    #[serde(default)]
    pub env_vars: Vec<EnvVar>,

    #[serde(default)]
    pub permissions: Option<Value>,

    #[serde(default)]
    pub repository_url: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub provenance: Option<Value>,

    #[serde(default)]
    pub metadata: Option<NativeEntryMetadata>,
}

/// Popularity/freshness block attached to native entries.
#[derive(Debug, Deserialize)]
pub struct NativeEntryMetadata {
    #[serde(default)]
    pub stars: Option<u64>,

    #[serde(default)]
    pub pulls: Option<u64>,

    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// A remote server entry.
#[derive(Debug, Deserialize)]
pub struct NativeRemoteEntry {
    pub url: String,

    #[serde(default = "default_remote_transport")]
    pub transport: Transport,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub tier: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub tools: Vec<String>,

    #[serde(default)]
    pub headers: Vec<HeaderSpec>,

    #[serde(default)]
    pub oauth_config: Option<Value>,

    #[serde(default)]
    pub repository_url: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub metadata: Option<NativeEntryMetadata>,
}

fn default_remote_transport() -> Transport {
    Transport::Sse
}

/// Parse native document bytes into the canonical registry.
pub fn parse(bytes: &[u8]) -> Result<ServerRegistry, SourceError> {
    let doc: NativeDocument = serde_json::from_slice(bytes)
        .map_err(|e| SourceError::Validation(format!("native document: {e}")))?;
    convert(doc)
}

/// Normalize a parsed native document.
pub fn convert(doc: NativeDocument) -> Result<ServerRegistry, SourceError> {
    if doc.servers.is_empty() && doc.remote_servers.is_empty() {
        warn!("[Native] registry document has no servers or remote_servers");
    }

    // The flat canonical list cannot hold the same full name twice, and the
    // two native namespaces are merged here, so an exact cross-namespace
    // duplicate is a hard error.
    for name in doc.servers.keys() {
        if doc.remote_servers.contains_key(name) {
            return Err(SourceError::Validation(format!(
                "server {name:?} appears in both servers and remote_servers"
            )));
        }
    }

    let mut servers = Vec::with_capacity(doc.servers.len() + doc.remote_servers.len());

    for (name, raw) in &doc.servers {
        if name.trim().is_empty() {
            return Err(SourceError::Validation(
                "server entry with empty name".to_string(),
            ));
        }
        let entry: NativeServerEntry = serde_json::from_value(raw.clone())
            .map_err(|e| SourceError::Validation(format!("server {name:?}: {e}")))?;
        match convert_container(name, entry) {
            Some(server) => servers.push(server),
            None => warn!("[Native] dropping server {name:?}: no image configured"),
        }
    }

    for (name, raw) in &doc.remote_servers {
        if name.trim().is_empty() {
            return Err(SourceError::Validation(
                "remote server entry with empty name".to_string(),
            ));
        }
        let entry: NativeRemoteEntry = serde_json::from_value(raw.clone())
            .map_err(|e| SourceError::Validation(format!("remote server {name:?}: {e}")))?;
        servers.push(convert_remote(name, entry));
    }

    let servers = dedup_simple_names(servers);

    Ok(ServerRegistry {
        schema_version: doc.version,
        last_updated: doc.last_updated.unwrap_or_else(Utc::now),
        servers,
    })
}

/// Keep the earlier entry on simple-name collisions; report the later one.
pub(crate) fn dedup_simple_names(servers: Vec<Server>) -> Vec<Server> {
    let mut seen: Vec<(String, String)> = Vec::with_capacity(servers.len());
    let mut out = Vec::with_capacity(servers.len());
    for server in servers {
        let simple = server.simple_name().to_string();
        if let Some((existing, _)) = seen.iter().find(|(_, s)| *s == simple) {
            warn!(
                "[Native] dropping {:?}: simple name {:?} already taken by {:?}",
                server.name, simple, existing
            );
            continue;
        }
        seen.push((server.name.clone(), simple));
        out.push(server);
    }
    out
}

fn convert_container(name: &str, entry: NativeServerEntry) -> Option<Server> {
    let image = entry.image?;
    let transport = entry.transport.unwrap_or_default();
    let version = image_version(&image);
    let meta = ServerMeta {
        tier: entry.tier,
        status: entry.status,
        transport: Some(transport),
        tools: entry.tools,
        env_vars: entry.env_vars,
        permissions: entry.permissions,
        repository_url: entry.repository_url,
        oauth_config: None,
        provenance: entry.provenance,
        last_updated: entry.metadata.and_then(|m| m.last_updated),
    };
    let package = Package {
        registry_type: "oci".to_string(),
        identifier: image,
        version: version.clone(),
        transport,
    };
    Some(Server {
        name: name.to_string(),
        description: entry.description.unwrap_or_default(),
        tags: entry.tags,
        version,
        packages: vec![package],
        remotes: vec![],
        meta: (!meta.is_empty()).then_some(meta),
    })
}

fn convert_remote(name: &str, entry: NativeRemoteEntry) -> Server {
    let meta = ServerMeta {
        tier: entry.tier,
        status: entry.status,
        transport: Some(entry.transport),
        tools: entry.tools,
        env_vars: vec![],
        permissions: None,
        repository_url: entry.repository_url,
        oauth_config: entry.oauth_config,
        provenance: None,
        last_updated: entry.metadata.and_then(|m| m.last_updated),
    };
    Server {
        name: name.to_string(),
        description: entry.description.unwrap_or_default(),
        tags: entry.tags,
        version: "latest".to_string(),
        packages: vec![],
        remotes: vec![RemoteEndpoint {
            url: entry.url,
            transport: entry.transport,
            headers: entry.headers,
        }],
        meta: (!meta.is_empty()).then_some(meta),
    }
}

/// Version carried by an OCI image reference: the tag after the final `:`
/// when that `:` follows the final `/` (a colon earlier is a registry
/// port), else `latest`.
fn image_version(image: &str) -> String {
    let after_slash = image.rsplit('/').next().unwrap_or(image);
    match after_slash.rsplit_once(':') {
        Some((_, tag)) if !tag.is_empty() => tag.to_string(),
        _ => "latest".to_string(),
    }
}
