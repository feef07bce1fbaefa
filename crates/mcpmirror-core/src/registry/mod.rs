//! Canonical registry model and the two wire formats that feed it.
//!
//! Sources deliver raw bytes in either the native (toolhive) single
//! document format or the upstream MCP registry list format; both are
//! normalized into [`ServerRegistry`], the only shape the rest of the
//! system touches.

pub mod native;
pub mod normalize;
pub mod types;
pub mod upstream;

use serde::{Deserialize, Serialize};

pub use normalize::{detect_document_format, parse_registry};
pub use types::{
    EnvVar, HeaderSpec, Package, RemoteEndpoint, Server, ServerMeta, ServerRegistry, Transport,
};

/// Wire format of a registry document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegistryFormat {
    /// Native single-document format.
    Toolhive,
    /// Upstream MCP registry list format.
    Upstream,
}

impl RegistryFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryFormat::Toolhive => "toolhive",
            RegistryFormat::Upstream => "upstream",
        }
    }
}

impl std::str::FromStr for RegistryFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "toolhive" => Ok(RegistryFormat::Toolhive),
            "upstream" => Ok(RegistryFormat::Upstream),
            other => Err(format!("unknown format: {other:?}")),
        }
    }
}

/// Derive the simple name: the substring after the last `/`, or the whole
/// name when there is none.
pub fn simple_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
