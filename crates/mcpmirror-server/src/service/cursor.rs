//! Opaque pagination cursors.
//!
//! A cursor encodes the snapshot epoch it was issued against and an
//! offset into that snapshot's match sequence. Cursors from a superseded
//! snapshot are rejected by the service, so a page walk never silently
//! mixes two snapshots.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use super::ServiceError;

const CURSOR_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
    pub epoch: u64,
    pub offset: usize,
}

pub(crate) fn encode(epoch: u64, offset: usize) -> String {
    URL_SAFE_NO_PAD.encode(format!("{CURSOR_VERSION}:{epoch}:{offset}"))
}

pub(crate) fn decode(raw: &str) -> Result<Cursor, ServiceError> {
    let invalid = || ServiceError::InvalidArgument(format!("invalid cursor {raw:?}"));
    let bytes = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    let mut parts = text.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(CURSOR_VERSION), Some(epoch), Some(offset), None) => Ok(Cursor {
            epoch: epoch.parse().map_err(|_| invalid())?,
            offset: offset.parse().map_err(|_| invalid())?,
        }),
        _ => Err(invalid()),
    }
}
