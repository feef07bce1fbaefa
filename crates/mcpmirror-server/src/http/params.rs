//! Path and query parameter hygiene.
//!
//! Every path parameter is URL-decoded by the router, then trimmed and
//! rejected here when empty, containing whitespace, or carrying traversal
//! tokens — before any of it reaches the service layer. Server names must
//! additionally match the reverse-DNS-or-simple grammar.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use mcpmirror_core::registry::RegistryFormat;

use super::error::ApiError;
use crate::service::ListQuery;

lazy_static! {
    /// `name` or `segment/segment[/...]`, segments limited to
    /// alphanumerics plus `.`, `_`, `-`.
    static ref SERVER_NAME: Regex =
        Regex::new(r"^[A-Za-z0-9._-]+(/[A-Za-z0-9._-]+)*$").unwrap();
}

/// Common checks for any path parameter.
pub fn path_param(raw: &str, what: &str) -> Result<String, ApiError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{what} must not be empty")));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(ApiError::bad_request(format!(
            "{what} must not contain whitespace"
        )));
    }
    if value.split('/').any(|segment| segment == "..") {
        return Err(ApiError::bad_request(format!(
            "{what} must not contain traversal segments"
        )));
    }
    Ok(value.to_string())
}

/// A server name parameter: hygiene plus the name grammar.
pub fn server_name(raw: &str) -> Result<String, ApiError> {
    let value = path_param(raw, "server name")?;
    if !SERVER_NAME.is_match(&value) {
        return Err(ApiError::bad_request(format!(
            "server name {value:?} is not a valid name"
        )));
    }
    Ok(value)
}

/// `?format=` negotiation; absent means toolhive.
pub fn format_param(raw: Option<&str>) -> Result<RegistryFormat, ApiError> {
    match raw {
        None => Ok(RegistryFormat::Toolhive),
        Some(value) => value
            .parse()
            .map_err(|e: String| ApiError::bad_request(e)),
    }
}

/// Raw query strings for `list_servers`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct ListParams {
    pub cursor: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    pub updated_since: Option<String>,
    pub version: Option<String>,
    pub format: Option<String>,
}

/// Parse the list query; any parse failure is a 400.
pub fn list_query(params: &ListParams) -> Result<ListQuery, ApiError> {
    let limit = params
        .limit
        .as_deref()
        .map(|raw| {
            raw.parse::<usize>()
                .map_err(|_| ApiError::bad_request(format!("invalid limit {raw:?}")))
        })
        .transpose()?;

    let updated_since = params
        .updated_since
        .as_deref()
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| {
                    ApiError::bad_request(format!("invalid updated_since timestamp {raw:?}"))
                })
        })
        .transpose()?;

    Ok(ListQuery {
        cursor: params.cursor.clone(),
        limit,
        search: params.search.clone(),
        updated_since,
        version: params.version.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_path_param_hygiene() {
        assert_eq!(path_param("ok-name", "p").unwrap(), "ok-name");
        assert!(path_param("", "p").is_err());
        assert!(path_param("   ", "p").is_err());
        assert!(path_param("has space", "p").is_err());
        assert!(path_param("tab\tname", "p").is_err());
        assert!(path_param("../etc", "p").is_err());
        assert!(path_param("a/../b", "p").is_err());
        let err = path_param("", "p").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_server_name_grammar() {
        assert!(server_name("redis").is_ok());
        assert!(server_name("io.github.acme/fetcher").is_ok());
        assert!(server_name("a/b/c").is_ok());
        assert!(server_name("bad name").is_err());
        assert!(server_name("name!").is_err());
        assert!(server_name("/leading").is_err());
        assert!(server_name("trailing/").is_err());
    }

    #[test]
    fn test_format_negotiation() {
        assert_eq!(format_param(None).unwrap(), RegistryFormat::Toolhive);
        assert_eq!(
            format_param(Some("toolhive")).unwrap(),
            RegistryFormat::Toolhive
        );
        assert_eq!(
            format_param(Some("upstream")).unwrap(),
            RegistryFormat::Upstream
        );
        assert!(format_param(Some("xml")).is_err());
    }

    #[test]
    fn test_list_query_parsing() {
        let params = ListParams {
            limit: Some("50".to_string()),
            updated_since: Some("2025-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        let query = list_query(&params).unwrap();
        assert_eq!(query.limit, Some(50));
        assert!(query.updated_since.is_some());

        let bad_limit = ListParams {
            limit: Some("many".to_string()),
            ..Default::default()
        };
        assert!(list_query(&bad_limit).is_err());

        let bad_time = ListParams {
            updated_since: Some("yesterday".to_string()),
            ..Default::default()
        };
        assert!(list_query(&bad_time).is_err());
    }
}
