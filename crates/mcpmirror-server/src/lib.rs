//! McpMirror server
//!
//! Wires the core sync pipeline to the outside world: the in-memory
//! registry service HTTP handlers read from, the sync coordinator lanes
//! that keep it fresh, and the versioned axum surface.

pub mod http;
pub mod service;
pub mod sync;

pub use http::build_router;
pub use service::{RegistryManager, RegistryService, ServiceError};
pub use sync::{SyncCoordinator, SyncHandle, SyncLauncher};
