//! Version ordering for the `latest` alias.
//!
//! Two versions that both parse as semver compare as semver; any other
//! pair falls back to plain string ordering. Insertion order breaks
//! exact ties, keeping the choice deterministic.

use std::cmp::Ordering;

use mcpmirror_core::registry::Server;

/// Pick the server whose version compares highest.
pub(crate) fn latest<'a>(servers: &'a [Server]) -> Option<&'a Server> {
    servers
        .iter()
        .max_by(|a, b| compare_versions(&a.version, &b.version))
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpmirror_core::registry::{RemoteEndpoint, Transport};

    fn server(version: &str) -> Server {
        Server {
            name: "s".to_string(),
            description: String::new(),
            tags: vec![],
            version: version.to_string(),
            packages: vec![],
            remotes: vec![RemoteEndpoint {
                url: "https://example.com".to_string(),
                transport: Transport::Sse,
                headers: vec![],
            }],
            meta: None,
        }
    }

    #[test]
    fn test_semver_ordering_beats_string_ordering() {
        // String ordering would pick "9.0.0" over "10.0.0".
        let servers = vec![server("9.0.0"), server("10.0.0")];
        assert_eq!(latest(&servers).unwrap().version, "10.0.0");
    }

    #[test]
    fn test_string_fallback_for_unparseable() {
        let servers = vec![server("build-a"), server("build-b")];
        assert_eq!(latest(&servers).unwrap().version, "build-b");
    }

    #[test]
    fn test_prerelease_sorts_below_release() {
        let servers = vec![server("1.0.0-rc.1"), server("1.0.0")];
        assert_eq!(latest(&servers).unwrap().version, "1.0.0");
    }

    #[test]
    fn test_empty_slice_has_no_latest() {
        assert!(latest(&[]).is_none());
    }
}
