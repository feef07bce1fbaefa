//! McpMirror core domain logic
//!
//! Everything the sync pipeline needs that is independent of the HTTP
//! surface: the canonical registry model, the source handlers that pull
//! raw catalogs from git/file/api sources, the validator/normalizer, the
//! filter engine, the sync decision rules, and the storage traits.

pub mod config;
pub mod error;
pub mod filter;
pub mod registry;
pub mod repository;
pub mod source;
pub mod sync;

pub use config::{
    ApiSourceConfig, FileSourceConfig, FilterConfig, FilterRules, GitSourceConfig, RegistryConfig,
    SourceConfig, SourceType, SyncPolicy,
};
pub use error::SourceError;
pub use registry::{
    Package, RegistryFormat, RemoteEndpoint, Server, ServerMeta, ServerRegistry, Transport,
};
pub use repository::RegistryStore;
pub use source::{source_handler_for, FetchResult, SourceHandler};
pub use sync::{should_sync, SyncContext, SyncDecision, SyncPhase, SyncReason, SyncStatus};
