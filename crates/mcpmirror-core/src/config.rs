//! Typed configuration for a mirrored registry.
//!
//! Loaded from a YAML file by the bootstrap front-end. Keys are camelCase
//! on the wire (`registryName`, `syncPolicy`); validation happens eagerly
//! in [`RegistryConfig::validate`] so a bad file fails startup instead of
//! the first sync.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::RegistryFormat;

/// Default sync interval when the policy block is omitted.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Name used when `registryName` is not set.
pub const DEFAULT_REGISTRY_NAME: &str = "default";

/// Configuration validation failures. Fatal at startup; 400 when a
/// registry descriptor arrives over the extension API.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("unsupported source type: {0}")]
    UnsupportedSourceType(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Top-level configuration for one registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Identifier for this registry.
    #[serde(default = "default_registry_name")]
    pub registry_name: String,

    /// Where the catalog comes from.
    pub source: SourceConfig,

    /// How often to sync, and the readiness knob.
    #[serde(default)]
    pub sync_policy: SyncPolicy,

    /// User-declared include/exclude rules.
    #[serde(default)]
    pub filter: Option<FilterConfig>,
}

fn default_registry_name() -> String {
    DEFAULT_REGISTRY_NAME.to_string()
}

impl RegistryConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: RegistryConfig = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the whole tree. Called on load and on descriptors received
    /// over the extension API.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry_name.trim().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "registryName",
                reason: "must not be empty".to_string(),
            });
        }
        self.source.validate()?;
        self.sync_policy.validate()?;
        Ok(())
    }
}

/// Kind of source backing a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Git,
    Api,
    File,
}

/// Source descriptor: one `type` plus the matching variant block.
/// The type tag is kept as the raw string so an unrecognized value
/// reports `UnsupportedSourceType` instead of an opaque parse error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// One of `git`, `api`, `file`.
    #[serde(rename = "type")]
    pub source_type: String,

    /// Explicit wire format; auto-detected when absent.
    #[serde(default)]
    pub format: Option<RegistryFormat>,

    #[serde(default)]
    pub git: Option<GitSourceConfig>,

    #[serde(default)]
    pub api: Option<ApiSourceConfig>,

    #[serde(default)]
    pub file: Option<FileSourceConfig>,
}

impl SourceConfig {
    /// Resolve the type tag.
    pub fn kind(&self) -> Result<SourceType, ConfigError> {
        match self.source_type.as_str() {
            "git" => Ok(SourceType::Git),
            "api" => Ok(SourceType::Api),
            "file" => Ok(SourceType::File),
            other => Err(ConfigError::UnsupportedSourceType(other.to_string())),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.kind()? {
            SourceType::Git => self
                .git
                .as_ref()
                .ok_or(ConfigError::MissingField("source.git"))?
                .validate(),
            SourceType::Api => self
                .api
                .as_ref()
                .ok_or(ConfigError::MissingField("source.api"))?
                .validate(),
            SourceType::File => self
                .file
                .as_ref()
                .ok_or(ConfigError::MissingField("source.file"))?
                .validate(),
        }
    }
}

/// Git repository source. Exactly one of branch/tag/commit may be set;
/// all absent means the remote default branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitSourceConfig {
    pub repository: String,

    #[serde(default)]
    pub branch: Option<String>,

    #[serde(default)]
    pub tag: Option<String>,

    #[serde(default)]
    pub commit: Option<String>,

    /// File within the repository.
    #[serde(default = "default_git_path")]
    pub path: String,
}

fn default_git_path() -> String {
    "registry.json".to_string()
}

impl GitSourceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repository.trim().is_empty() {
            return Err(ConfigError::MissingField("source.git.repository"));
        }
        let selectors = [&self.branch, &self.tag, &self.commit]
            .iter()
            .filter(|s| s.as_ref().is_some_and(|v| !v.trim().is_empty()))
            .count();
        if selectors > 1 {
            return Err(ConfigError::InvalidField {
                field: "source.git",
                reason: "branch, tag and commit are mutually exclusive".to_string(),
            });
        }
        if self.path.trim().is_empty() {
            return Err(ConfigError::MissingField("source.git.path"));
        }
        Ok(())
    }
}

/// Remote registry API source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSourceConfig {
    /// Base URL, no trailing slash.
    pub endpoint: String,
}

impl ApiSourceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingField("source.api.endpoint"));
        }
        url::Url::parse(&self.endpoint).map_err(|e| ConfigError::InvalidField {
            field: "source.api.endpoint",
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Endpoint with any trailing slash stripped.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}

/// Local file source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSourceConfig {
    pub path: String,
}

impl FileSourceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.trim().is_empty() {
            return Err(ConfigError::MissingField("source.file.path"));
        }
        if Path::new(&self.path)
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(ConfigError::InvalidField {
                field: "source.file.path",
                reason: "path must not contain '..' segments".to_string(),
            });
        }
        Ok(())
    }
}

/// Sync cadence and readiness policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPolicy {
    /// Duration string: `30m`, `1h`, `90s`, `1h30m`.
    #[serde(default = "default_interval_string")]
    pub interval: String,

    /// Whether a zero-server snapshot still counts as ready.
    #[serde(default)]
    pub allow_empty: bool,
}

fn default_interval_string() -> String {
    "30m".to_string()
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            interval: default_interval_string(),
            allow_empty: false,
        }
    }
}

impl SyncPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.interval_duration().map(|_| ())
    }

    /// Parse the configured interval string.
    pub fn interval_duration(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.interval).map_err(|reason| ConfigError::InvalidField {
            field: "syncPolicy.interval",
            reason,
        })
    }
}

/// Include/exclude rules for names (globs) and tags (exact).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    #[serde(default)]
    pub names: FilterRules,

    #[serde(default)]
    pub tags: FilterRules,
}

/// One rule group. Empty include means match-all.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FilterRules {
    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Parse duration strings like `30m`, `1h`, `90s`, `1h30m`. A bare number
/// is seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut digits = String::new();
    for ch in s.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration {s:?}"))?;
        digits.clear();
        let unit = match ch {
            's' => Duration::from_secs(1),
            'm' => Duration::from_secs(60),
            'h' => Duration::from_secs(3600),
            'd' => Duration::from_secs(86400),
            _ => return Err(format!("unknown duration unit {ch:?} in {s:?}")),
        };
        total += unit * value as u32;
    }
    if !digits.is_empty() {
        return Err(format!("trailing digits without a unit in {s:?}"));
    }
    if total.is_zero() {
        return Err(format!("duration {s:?} must be positive"));
    }
    Ok(total)
}
