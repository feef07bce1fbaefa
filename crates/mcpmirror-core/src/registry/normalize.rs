//! Format dispatch for raw registry bytes.

use super::{native, upstream, RegistryFormat, ServerRegistry};
use crate::error::SourceError;

/// Parse raw bytes in the given wire format into the canonical registry.
pub fn parse_registry(bytes: &[u8], format: RegistryFormat) -> Result<ServerRegistry, SourceError> {
    match format {
        RegistryFormat::Toolhive => native::parse(bytes),
        RegistryFormat::Upstream => upstream::parse(bytes),
    }
}

/// Detect the wire format of a standalone document (git/file sources with
/// no configured format): a JSON object is native, a JSON array is the
/// upstream list.
pub fn detect_document_format(bytes: &[u8]) -> Result<RegistryFormat, SourceError> {
    let first = bytes
        .iter()
        .copied()
        .find(|b| !b.is_ascii_whitespace())
        .ok_or_else(|| SourceError::FormatDetectionFailed("empty document".to_string()))?;
    match first {
        b'{' => Ok(RegistryFormat::Toolhive),
        b'[' => Ok(RegistryFormat::Upstream),
        other => Err(SourceError::FormatDetectionFailed(format!(
            "document starts with unexpected byte {:?}",
            other as char
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_object_is_native() {
        assert_eq!(
            detect_document_format(br#"  {"servers":{}}"#).unwrap(),
            RegistryFormat::Toolhive
        );
    }

    #[test]
    fn test_detect_array_is_upstream() {
        assert_eq!(
            detect_document_format(br#"[]"#).unwrap(),
            RegistryFormat::Upstream
        );
    }

    #[test]
    fn test_detect_garbage_fails() {
        assert!(matches!(
            detect_document_format(b"not json").unwrap_err(),
            SourceError::FormatDetectionFailed(_)
        ));
        assert!(matches!(
            detect_document_format(b"   ").unwrap_err(),
            SourceError::FormatDetectionFailed(_)
        ));
    }

    #[test]
    fn test_parse_dispatches_by_format() {
        let native = br#"{"servers":{"a":{"image":"x:1"}}}"#;
        assert_eq!(
            parse_registry(native, RegistryFormat::Toolhive)
                .unwrap()
                .len(),
            1
        );
        let upstream = br#"[{"server":{"name":"a","description":"d","remotes":[{"type":"sse","url":"https://x"}]}}]"#;
        assert_eq!(
            parse_registry(upstream, RegistryFormat::Upstream)
                .unwrap()
                .len(),
            1
        );
    }
}
