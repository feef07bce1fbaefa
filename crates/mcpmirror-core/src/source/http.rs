//! Bounded HTTP client for registry API sources.
//!
//! Every request carries an explicit timeout, a User-Agent, and
//! `Accept: application/json`. Response bodies are capped at
//! [`MAX_FETCH_BYTES`](super::MAX_FETCH_BYTES): `Content-Length` is
//! checked before the body is pulled, and the stream is counted anyway in
//! case the header lied or was absent.

use std::time::Duration;

use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::MAX_FETCH_BYTES;
use crate::error::SourceError;

/// Default per-request timeout for API sources.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// reqwest wrapper enforcing the size cap and cancellation.
pub struct BoundedHttpClient {
    client: reqwest::Client,
    timeout: Duration,
    limit: u64,
}

impl BoundedHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mcpmirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Io(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout,
            limit: MAX_FETCH_BYTES,
        })
    }

    #[cfg(test)]
    pub fn with_limit(timeout: Duration, limit: u64) -> Result<Self, SourceError> {
        let mut client = Self::new(timeout)?;
        client.limit = limit;
        Ok(client)
    }

    /// GET a URL and return the full body, subject to the size cap.
    pub async fn get_bytes(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SourceError> {
        debug!("[Http] GET {}", url);

        let request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SourceError::Cancelled),
            result = request.send() => result.map_err(|e| self.map_error(e))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Io(format!("GET {url} returned {status}")));
        }

        // Preflight: trust Content-Length only to reject early.
        if let Some(length) = response.content_length() {
            if length > self.limit {
                return Err(SourceError::ResponseTooLarge {
                    size: length,
                    limit: self.limit,
                });
            }
        }

        let mut body: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SourceError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(|e| self.map_error(e))?;
            if body.len() as u64 + chunk.len() as u64 > self.limit {
                return Err(SourceError::ResponseTooLarge {
                    size: body.len() as u64 + chunk.len() as u64,
                    limit: self.limit,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }

    /// GET a URL and deserialize the JSON body. Returns the raw bytes too
    /// so callers can feed the content hash.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<(T, Vec<u8>), SourceError> {
        let body = self.get_bytes(url, cancel).await?;
        let value = serde_json::from_slice(&body)
            .map_err(|e| SourceError::Validation(format!("GET {url}: {e}")))?;
        Ok((value, body))
    }

    fn map_error(&self, err: reqwest::Error) -> SourceError {
        if err.is_timeout() {
            SourceError::Timeout(self.timeout)
        } else {
            SourceError::Io(err.to_string())
        }
    }
}
