//! Canonical internal registry types.
//!
//! A [`ServerRegistry`] is immutable once a sync publishes it; consumers
//! hold it behind an `Arc` and never mutate in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport protocol an MCP server speaks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    /// Local process via stdio.
    #[default]
    Stdio,
    /// Remote server via Streamable HTTP.
    StreamableHttp,
    /// Remote server via Server-Sent Events.
    Sse,
}

/// A package-distributed server artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Package {
    /// Package ecosystem, e.g. `oci`, `npm`, `pypi`.
    pub registry_type: String,

    /// Package identifier within the ecosystem.
    pub identifier: String,

    /// Artifact version.
    pub version: String,

    #[serde(default)]
    pub transport: Transport,
}

/// A header a client must send to a remote endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub secret: bool,
}

/// A URL-addressed server endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub url: String,

    #[serde(default)]
    pub transport: Transport,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderSpec>,
}

/// Environment variable a server expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvVar {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub secret: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Extension attributes carried through from the source document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerMeta {
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
    pub permissions: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_config: Option<serde_json::Value>,

    /// OCI provenance attestation data, if the source publishes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<serde_json::Value>,

    /// Per-server update timestamp, when the source tracks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ServerMeta {
    /// True when no field carries data; such a block is omitted from
    /// serialized servers entirely.
    pub fn is_empty(&self) -> bool {
        self.tier.is_none()
            && self.status.is_none()
            && self.transport.is_none()
            && self.tools.is_empty()
            && self.env_vars.is_empty()
            && self.permissions.is_none()
            && self.repository_url.is_none()
            && self.oauth_config.is_none()
            && self.provenance.is_none()
            && self.last_updated.is_none()
    }
}

/// One catalog entry. Carries at least one of `packages` / `remotes`;
/// the normalizer drops entries with neither.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Server {
    /// Unique name, possibly reverse-DNS style (`domain/local`).
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default)]
    pub version: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<Package>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remotes: Vec<RemoteEndpoint>,

    #[serde(
        default,
        rename = "_meta",
        skip_serializing_if = "Option::is_none"
    )]
    pub meta: Option<ServerMeta>,
}

impl Server {
    /// The substring after the last `/`, or the whole name.
    pub fn simple_name(&self) -> &str {
        super::simple_name(&self.name)
    }

    /// True when the entry describes something a client can reach.
    pub fn has_endpoint(&self) -> bool {
        !self.packages.is_empty() || !self.remotes.is_empty()
    }

    /// Match a lookup key against the full name or the simple name.
    pub fn matches_name(&self, key: &str) -> bool {
        self.name == key || self.simple_name() == key
    }

    /// Per-server update timestamp if the source tracked one.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.meta.as_ref().and_then(|m| m.last_updated)
    }
}

/// The canonical, normalized catalog. Insertion order of `servers` is the
/// discovery order from the source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerRegistry {
    pub schema_version: String,

    pub last_updated: DateTime<Utc>,

    #[serde(default)]
    pub servers: Vec<Server>,
}

impl ServerRegistry {
    /// Current canonical schema version.
    pub const SCHEMA_VERSION: &'static str = "1.0.0";

    pub fn new(last_updated: DateTime<Utc>, servers: Vec<Server>) -> Self {
        Self {
            schema_version: Self::SCHEMA_VERSION.to_string(),
            last_updated,
            servers,
        }
    }

    pub fn empty() -> Self {
        Self::new(Utc::now(), Vec::new())
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Look up a server by full name first, then by simple name.
    pub fn get(&self, key: &str) -> Option<&Server> {
        self.servers
            .iter()
            .find(|s| s.name == key)
            .or_else(|| self.servers.iter().find(|s| s.simple_name() == key))
    }

    /// All entries matching a name under either form, in insertion order.
    pub fn get_all(&self, key: &str) -> Vec<&Server> {
        let exact: Vec<&Server> = self.servers.iter().filter(|s| s.name == key).collect();
        if !exact.is_empty() {
            return exact;
        }
        self.servers
            .iter()
            .filter(|s| s.simple_name() == key)
            .collect()
    }
}
