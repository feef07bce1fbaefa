//! HTTP handlers for the registry server.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use mcpmirror_core::config::{FilterConfig, RegistryConfig, SourceConfig, SyncPolicy};
use mcpmirror_core::registry::{upstream, RegistryFormat, Server};

use super::error::ApiError;
use super::params;
use super::AppState;
use crate::service::{RegistryEntry, ServiceError};

// ---------------------------------------------------------------------
// Operational endpoints
// ---------------------------------------------------------------------

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn readiness(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let entry = default_entry(&state)?;
    match entry.service.check_readiness() {
        Ok(()) => Ok(Json(json!({ "status": "ready" }))),
        Err(reason) => Err(ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: reason,
        }),
    }
}

pub async fn version() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn openapi() -> Json<Value> {
    Json(super::openapi::document())
}

// ---------------------------------------------------------------------
// Read API (default registry)
// ---------------------------------------------------------------------

pub async fn list_servers(
    State(state): State<AppState>,
    Query(raw): Query<params::ListParams>,
) -> Result<Json<Value>, ApiError> {
    let format = params::format_param(raw.format.as_deref())?;
    let query = params::list_query(&raw)?;
    let entry = default_entry(&state)?;
    let page = entry.service.list_servers(&query)?;

    let servers = shape_servers(&page.servers, format)?;
    let mut metadata = serde_json::Map::new();
    metadata.insert("count".to_string(), json!(page.total));
    if let Some(next) = page.next_cursor {
        metadata.insert("next_cursor".to_string(), json!(next));
    }
    Ok(Json(json!({ "servers": servers, "metadata": metadata })))
}

pub async fn get_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(raw): Query<FormatParams>,
) -> Result<Json<Value>, ApiError> {
    let name = params::server_name(&name)?;
    let format = params::format_param(raw.format.as_deref())?;
    let entry = default_entry(&state)?;
    let server = entry.service.get_server_version(&name, "latest")?;
    Ok(Json(shape_server(&server, format)?))
}

pub async fn list_server_versions(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(raw): Query<FormatParams>,
) -> Result<Json<Value>, ApiError> {
    let name = params::server_name(&name)?;
    let format = params::format_param(raw.format.as_deref())?;
    let entry = default_entry(&state)?;
    let versions = entry.service.list_server_versions(&name)?;
    Ok(Json(json!({ "versions": shape_servers(&versions, format)? })))
}

pub async fn get_server_version(
    State(state): State<AppState>,
    Path((name, version)): Path<(String, String)>,
    Query(raw): Query<FormatParams>,
) -> Result<Json<Value>, ApiError> {
    let name = params::server_name(&name)?;
    let version = params::path_param(&version, "version")?;
    let format = params::format_param(raw.format.as_deref())?;
    let entry = default_entry(&state)?;
    let server = entry.service.get_server_version(&name, &version)?;
    Ok(Json(shape_server(&server, format)?))
}

// ---------------------------------------------------------------------
// Publish API (per registry)
// ---------------------------------------------------------------------

pub async fn publish(
    State(state): State<AppState>,
    Path(registry_name): Path<String>,
    Query(raw): Query<FormatParams>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let registry_name = params::path_param(&registry_name, "registry name")?;
    let format = params::format_param(raw.format.as_deref())?;
    let entry = registry_entry(&state, &registry_name)?;

    let server = parse_server_body(body, format)?;
    info!(
        "[Http] publish {}@{} to {}",
        server.name, server.version, registry_name
    );
    let echo = shape_server(&server, format)?;
    entry.service.publish_version(server).await?;
    Ok((StatusCode::CREATED, Json(echo)))
}

pub async fn delete_server_version(
    State(state): State<AppState>,
    Path((registry_name, name, version)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let registry_name = params::path_param(&registry_name, "registry name")?;
    let name = params::server_name(&name)?;
    let version = params::path_param(&version, "version")?;
    let entry = registry_entry(&state, &registry_name)?;
    entry.service.delete_version(&name, &version).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------
// Extension API (registry administration)
// ---------------------------------------------------------------------

/// Create/update body for the extension API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryUpsertRequest {
    pub name: String,
    #[serde(default)]
    pub source: Option<SourceConfig>,
    #[serde(default)]
    pub sync_policy: Option<SyncPolicy>,
    #[serde(default)]
    pub filter: Option<FilterConfig>,
}

impl RegistryUpsertRequest {
    fn into_config(self) -> Option<RegistryConfig> {
        let source = self.source?;
        Some(RegistryConfig {
            registry_name: self.name,
            source,
            sync_policy: self.sync_policy.unwrap_or_default(),
            filter: self.filter,
        })
    }
}

pub async fn list_registries(State(state): State<AppState>) -> Json<Value> {
    let registries: Vec<Value> = state
        .manager
        .list()
        .iter()
        .map(|entry| json!(entry.descriptor()))
        .collect();
    Json(json!({ "registries": registries }))
}

pub async fn get_registry(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let name = params::path_param(&name, "registry name")?;
    let entry = registry_entry(&state, &name)?;
    Ok(Json(json!(entry.descriptor())))
}

pub async fn create_registry(
    State(state): State<AppState>,
    Json(mut request): Json<RegistryUpsertRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let name = params::path_param(&request.name, "registry name")?;
    request.name = name.clone();

    let entry = match request.into_config() {
        Some(config) => state.launcher.launch_synced(config, false)?,
        None => state.launcher.create_managed(&name),
    };
    let entry = state.manager.insert(entry)?;
    info!("[Http] created registry {:?}", name);
    Ok((StatusCode::CREATED, Json(json!(entry.descriptor()))))
}

pub async fn update_registry(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<RegistryUpsertRequest>,
) -> Result<Json<Value>, ApiError> {
    let name = params::path_param(&name, "registry name")?;
    if request.name != name {
        return Err(ApiError::bad_request(
            "registry name in body does not match the path",
        ));
    }
    let existing = registry_entry(&state, &name)?;
    if existing.config_owned {
        return Err(ServiceError::Forbidden(format!(
            "registry {name:?} is owned by the server configuration"
        ))
        .into());
    }

    let entry = match (existing.sync.is_some(), request.into_config()) {
        // Synced registry with a new descriptor: relaunch the lane.
        (true, Some(config)) => {
            let entry = state.launcher.launch_synced(config, false)?;
            state.manager.replace(entry)?
        }
        // Managed registry with no source: nothing to reconfigure.
        (false, None) => existing,
        // Converting between managed and synced is not supported.
        _ => {
            return Err(ServiceError::NotImplemented(
                "converting a registry between managed and synced is not implemented".to_string(),
            )
            .into())
        }
    };
    Ok(Json(json!(entry.descriptor())))
}

pub async fn delete_registry(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let name = params::path_param(&name, "registry name")?;
    state.manager.remove(&name)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn trigger_sync(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let name = params::path_param(&name, "registry name")?;
    let entry = registry_entry(&state, &name)?;
    let Some(sync) = &entry.sync else {
        return Err(ApiError::bad_request(format!(
            "registry {name:?} is managed and has no sync lane"
        )));
    };
    let decision = sync.trigger().await;
    Ok((StatusCode::ACCEPTED, Json(json!({ "decision": decision }))))
}

// ---------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct FormatParams {
    pub format: Option<String>,
}

fn default_entry(state: &AppState) -> Result<Arc<RegistryEntry>, ApiError> {
    state.manager.default_entry().ok_or_else(|| {
        ApiError::not_found(format!(
            "registry {:?} is not configured",
            state.manager.default_name()
        ))
    })
}

fn registry_entry(state: &AppState, name: &str) -> Result<Arc<RegistryEntry>, ApiError> {
    state
        .manager
        .get(name)
        .ok_or_else(|| ApiError::not_found(format!("registry {name:?} not found")))
}

fn shape_server(server: &Server, format: RegistryFormat) -> Result<Value, ApiError> {
    let value = match format {
        RegistryFormat::Toolhive => serde_json::to_value(server),
        RegistryFormat::Upstream => serde_json::to_value(upstream::to_server_detail(server)),
    };
    value.map_err(|e| ServiceError::Internal(e.into()).into())
}

fn shape_servers(servers: &[Server], format: RegistryFormat) -> Result<Vec<Value>, ApiError> {
    servers.iter().map(|s| shape_server(s, format)).collect()
}

/// Parse a publish body in the negotiated format into a canonical server.
fn parse_server_body(body: Value, format: RegistryFormat) -> Result<Server, ApiError> {
    match format {
        RegistryFormat::Toolhive => serde_json::from_value(body)
            .map_err(|e| ApiError::bad_request(format!("invalid server body: {e}"))),
        RegistryFormat::Upstream => {
            let detail: upstream::ServerDetail = serde_json::from_value(body)
                .map_err(|e| ApiError::bad_request(format!("invalid server body: {e}")))?;
            let registry = upstream::convert(vec![detail])
                .map_err(|e| ApiError::bad_request(e.to_string()))?;
            registry
                .servers
                .into_iter()
                .next()
                .ok_or_else(|| ApiError::bad_request("server body has no usable entry"))
        }
    }
}
