//! HTTP surface.
//!
//! Routes live under two prefixes: `/registry/v0.1` (the read API over
//! the default registry, plus publish under `/{registryName}/v0.1`) and
//! `/extension/v0` (registry administration). Operational endpoints sit
//! at the root.

pub mod error;
pub mod handlers;
mod openapi;
pub mod params;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::RegistryManager;
use crate::sync::SyncLauncher;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<RegistryManager>,
    pub launcher: Arc<SyncLauncher>,
}

/// Build the full router.
pub fn build_router(state: AppState, enable_cors: bool) -> Router {
    let mut router = Router::new()
        // Operational endpoints
        .route("/health", get(handlers::health))
        .route("/readiness", get(handlers::readiness))
        .route("/version", get(handlers::version))
        .route("/openapi.json", get(handlers::openapi))
        // Read API over the default registry
        .route("/registry/v0.1/servers", get(handlers::list_servers))
        .route("/registry/v0.1/servers/{name}", get(handlers::get_server))
        .route(
            "/registry/v0.1/servers/{name}/versions",
            get(handlers::list_server_versions),
        )
        .route(
            "/registry/v0.1/servers/{name}/versions/{version}",
            get(handlers::get_server_version),
        )
        // Publish API, addressed by registry name
        .route("/{registry_name}/v0.1/publish", post(handlers::publish))
        .route(
            "/{registry_name}/v0.1/servers/{name}/versions/{version}",
            delete(handlers::delete_server_version),
        )
        // Extension API: registry administration
        .route(
            "/extension/v0/registries",
            get(handlers::list_registries).post(handlers::create_registry),
        )
        .route(
            "/extension/v0/registries/{name}",
            get(handlers::get_registry)
                .put(handlers::update_registry)
                .delete(handlers::delete_registry),
        )
        .route(
            "/extension/v0/registries/{name}/sync",
            post(handlers::trigger_sync),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router = router.layer(cors);
    }

    router
}
