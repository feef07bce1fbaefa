//! Persisted sync status for one registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of the most recent sync attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncPhase {
    Syncing,
    Complete,
    Failed,
}

/// Durable record of sync progress. Written on every phase transition;
/// the write must land before the next attempt begins so crash recovery
/// reads an accurate history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncStatus {
    pub phase: SyncPhase,

    pub last_attempt: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,

    /// Consecutive failures since the last success.
    #[serde(default)]
    pub attempt_count: u32,

    /// Hex SHA-256 of the source bytes behind the last successful sync.
    #[serde(default)]
    pub last_hash: String,

    /// Servers in the filtered snapshot.
    #[serde(default)]
    pub server_count: usize,

    /// Human-readable summary of the last transition.
    #[serde(default)]
    pub message: String,

    /// Hex hash of the canonical filter serialization in force at the
    /// last successful sync.
    #[serde(default)]
    pub filter_hash: String,
}

impl SyncStatus {
    /// Status for an attempt that just started.
    pub fn syncing(previous: Option<&SyncStatus>, now: DateTime<Utc>) -> Self {
        let prev = previous.cloned();
        Self {
            phase: SyncPhase::Syncing,
            last_attempt: now,
            last_success: prev.as_ref().and_then(|p| p.last_success),
            attempt_count: prev.as_ref().map(|p| p.attempt_count + 1).unwrap_or(1),
            last_hash: prev.as_ref().map(|p| p.last_hash.clone()).unwrap_or_default(),
            server_count: prev.as_ref().map(|p| p.server_count).unwrap_or(0),
            message: "sync in progress".to_string(),
            filter_hash: prev.map(|p| p.filter_hash).unwrap_or_default(),
        }
    }

    /// Status after a successful attempt.
    pub fn complete(
        &self,
        now: DateTime<Utc>,
        source_hash: String,
        filter_hash: String,
        server_count: usize,
    ) -> Self {
        Self {
            phase: SyncPhase::Complete,
            last_attempt: self.last_attempt,
            last_success: Some(now),
            attempt_count: 0,
            last_hash: source_hash,
            server_count,
            message: format!("synced {server_count} servers"),
            filter_hash,
        }
    }

    /// Status after a failed attempt. The previous snapshot fields stay
    /// intact so the registry keeps serving the last good data.
    pub fn failed(&self, message: String) -> Self {
        Self {
            phase: SyncPhase::Failed,
            message,
            ..self.clone()
        }
    }
}
