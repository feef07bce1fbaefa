//! Serialized OpenAPI description of the HTTP surface.
//!
//! Assembled by hand; the document generator itself is an external
//! concern. Paths and parameters mirror the router in `http::mod`.

use serde_json::{json, Value};

pub(crate) fn document() -> Value {
    json!({
        "openapi": "3.1.0",
        "info": {
            "title": "McpMirror Registry API",
            "description": "Read-mostly API over mirrored MCP server catalogs.",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": {
            "/health": { "get": { "summary": "Liveness probe" } },
            "/readiness": { "get": { "summary": "Readiness probe" } },
            "/version": { "get": { "summary": "Build metadata" } },
            "/registry/v0.1/servers": {
                "get": {
                    "summary": "List servers in the default registry",
                    "parameters": [
                        { "name": "cursor", "in": "query", "schema": { "type": "string" } },
                        { "name": "limit", "in": "query", "schema": { "type": "integer", "maximum": 1000 } },
                        { "name": "search", "in": "query", "schema": { "type": "string" } },
                        { "name": "updated_since", "in": "query", "schema": { "type": "string", "format": "date-time" } },
                        { "name": "version", "in": "query", "schema": { "type": "string" } },
                        { "name": "format", "in": "query", "schema": { "type": "string", "enum": ["toolhive", "upstream"] } }
                    ]
                }
            },
            "/registry/v0.1/servers/{name}": {
                "get": { "summary": "Latest version of one server" }
            },
            "/registry/v0.1/servers/{name}/versions": {
                "get": { "summary": "All versions of one server" }
            },
            "/registry/v0.1/servers/{name}/versions/{version}": {
                "get": { "summary": "One version of one server ('latest' supported)" }
            },
            "/{registryName}/v0.1/publish": {
                "post": { "summary": "Publish a server version to a managed registry" }
            },
            "/{registryName}/v0.1/servers/{name}/versions/{version}": {
                "delete": { "summary": "Delete a server version from a managed registry" }
            },
            "/extension/v0/registries": {
                "get": { "summary": "List hosted registries" },
                "post": { "summary": "Create a registry" }
            },
            "/extension/v0/registries/{name}": {
                "get": { "summary": "Registry descriptor and sync status" },
                "put": { "summary": "Reconfigure a runtime-created registry" },
                "delete": { "summary": "Remove a runtime-created registry" }
            },
            "/extension/v0/registries/{name}/sync": {
                "post": { "summary": "Trigger a sync now" }
            }
        }
    })
}
