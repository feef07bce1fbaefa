//! The per-registry sync loop.
//!
//! One cooperative task per lane. Wakeups come from the interval timer or
//! a manual trigger; each wakeup consults the decision function and, when
//! it says yes, runs one attempt: status → Syncing, fetch, filter, store,
//! snapshot swap, status → Complete. Failures record Failed and keep the
//! previous snapshot serving. Cancellation aborts at the next suspension
//! point without writing status.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mcpmirror_core::config::FilterConfig;
use mcpmirror_core::error::SourceError;
use mcpmirror_core::filter;
use mcpmirror_core::repository::RegistryStore;
use mcpmirror_core::source::SourceHandler;
use mcpmirror_core::sync::{should_sync, SyncContext, SyncDecision, SyncReason, SyncStatus};

use crate::service::RegistryService;

struct TriggerRequest {
    reply: oneshot::Sender<SyncDecision>,
}

/// Handle to a running lane: manual triggers and shutdown.
pub struct SyncHandle {
    trigger_tx: mpsc::Sender<TriggerRequest>,
    cancel: CancellationToken,
    slot: Arc<Semaphore>,
}

impl SyncHandle {
    /// Request a sync now. If an attempt is already in flight the trigger
    /// is coalesced: the running attempt continues and the caller gets
    /// `AlreadyInProgress`.
    pub async fn trigger(&self) -> SyncDecision {
        if self.slot.available_permits() == 0 {
            return SyncDecision {
                sync: false,
                reason: SyncReason::AlreadyInProgress,
                next_check: None,
            };
        }
        let (reply, rx) = oneshot::channel();
        if self.trigger_tx.send(TriggerRequest { reply }).await.is_err() {
            // Lane already shut down.
            return SyncDecision {
                sync: false,
                reason: SyncReason::AlreadyInProgress,
                next_check: None,
            };
        }
        match rx.await {
            Ok(decision) => decision,
            Err(_) => SyncDecision {
                sync: false,
                reason: SyncReason::AlreadyInProgress,
                next_check: None,
            },
        }
    }

    /// Stop the lane. The in-flight attempt, if any, aborts at its next
    /// suspension point.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Owns one registry's sync loop.
pub struct SyncCoordinator {
    name: String,
    service: Arc<RegistryService>,
    store: Arc<dyn RegistryStore>,
    handler: Box<dyn SourceHandler>,
    filter: Option<FilterConfig>,
    filter_hash: String,
    interval: Duration,
    min_retry_backoff: Duration,
    slot: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl SyncCoordinator {
    /// Build the coordinator and spawn its lane.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        name: String,
        service: Arc<RegistryService>,
        store: Arc<dyn RegistryStore>,
        handler: Box<dyn SourceHandler>,
        filter: Option<FilterConfig>,
        interval: Duration,
        min_retry_backoff: Duration,
        cancel: CancellationToken,
    ) -> SyncHandle {
        let filter_hash = filter::filter_hash(filter.as_ref());
        let slot = Arc::new(Semaphore::new(1));
        let (trigger_tx, trigger_rx) = mpsc::channel(1);

        let coordinator = Self {
            name,
            service,
            store,
            handler,
            filter,
            filter_hash,
            interval,
            min_retry_backoff,
            slot: slot.clone(),
            cancel: cancel.clone(),
        };
        tokio::spawn(coordinator.run(trigger_rx));

        SyncHandle {
            trigger_tx,
            cancel,
            slot,
        }
    }

    async fn run(self, mut trigger_rx: mpsc::Receiver<TriggerRequest>) {
        info!("[Sync] {}: lane started", self.name);
        self.restore().await;

        // First wakeup fires immediately; the decision function decides
        // whether anything actually runs.
        let mut delay = Duration::ZERO;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("[Sync] {}: lane stopping", self.name);
                    break;
                }
                Some(request) = trigger_rx.recv() => {
                    let decision = self.wakeup(true).await;
                    let _ = request.reply.send(decision.clone());
                    delay = self.next_delay(&decision);
                }
                _ = tokio::time::sleep(delay) => {
                    let decision = self.wakeup(false).await;
                    delay = self.next_delay(&decision);
                }
            }
        }
    }

    /// Re-install the persisted snapshot and status on startup so the
    /// registry serves its last good data before the first fetch.
    async fn restore(&self) {
        match self.store.get().await {
            Ok(Some(registry)) => {
                info!(
                    "[Sync] {}: restored snapshot with {} servers",
                    self.name,
                    registry.len()
                );
                self.service.install_snapshot(Arc::new(registry));
            }
            Ok(None) => {}
            Err(e) => warn!("[Sync] {}: failed to restore snapshot: {e:#}", self.name),
        }
        match self.store.get_status().await {
            Ok(Some(status)) => self.service.set_status(status),
            Ok(None) => {}
            Err(e) => warn!("[Sync] {}: failed to restore status: {e:#}", self.name),
        }
    }

    async fn wakeup(&self, manual: bool) -> SyncDecision {
        let Ok(permit) = self.slot.try_acquire() else {
            return SyncDecision {
                sync: false,
                reason: SyncReason::AlreadyInProgress,
                next_check: None,
            };
        };

        let status = self.service.status();
        let source_hash = match self.handler.current_hash(&self.cancel).await {
            Ok(hash) => hash,
            Err(SourceError::Cancelled) => return no_decision(SyncReason::UpToDate),
            Err(e) => {
                warn!("[Sync] {}: current hash probe failed: {e}", self.name);
                None
            }
        };

        let decision = should_sync(&SyncContext {
            status: status.as_ref(),
            source_hash: source_hash.as_deref(),
            filter_hash: &self.filter_hash,
            in_flight: false,
            manual,
            now: Utc::now(),
            interval: self.interval,
            min_retry_backoff: self.min_retry_backoff,
        });
        debug!(
            "[Sync] {}: decision sync={} reason={:?}",
            self.name, decision.sync, decision.reason
        );

        if decision.sync {
            self.run_attempt(status, source_hash).await;
        }
        drop(permit);
        decision
    }

    /// One attempt. Ordering matters: the store write is linearized
    /// before the snapshot swap, so a reader that sees the new snapshot
    /// will also see at least as new a persisted registry. Every store
    /// write is a suspension point: cancellation observed there aborts
    /// the attempt with the persisted status left as it was.
    async fn run_attempt(&self, previous: Option<SyncStatus>, cheap_hash: Option<String>) {
        if self.cancel.is_cancelled() {
            info!("[Sync] {}: attempt cancelled before it started", self.name);
            return;
        }
        let syncing = SyncStatus::syncing(previous.as_ref(), Utc::now());
        if let Err(e) = self.store.put_status(&syncing, &self.cancel).await {
            if self.cancel.is_cancelled() {
                info!("[Sync] {}: attempt cancelled at status write", self.name);
            } else {
                error!(
                    "[Sync] {}: aborting attempt, cannot persist status: {e:#}",
                    self.name
                );
            }
            return;
        }
        self.service.set_status(syncing.clone());

        // Source unchanged and same filter: only the status needs a write.
        if let Some(hash) = &cheap_hash {
            if !syncing.last_hash.is_empty()
                && *hash == syncing.last_hash
                && syncing.filter_hash == self.filter_hash
            {
                debug!("[Sync] {}: source unchanged, refreshing status only", self.name);
                let status = syncing.complete(
                    Utc::now(),
                    hash.clone(),
                    self.filter_hash.clone(),
                    syncing.server_count,
                );
                self.persist_status(status).await;
                return;
            }
        }

        let fetched = match self.handler.fetch(&self.cancel).await {
            Ok(fetched) => fetched,
            Err(SourceError::Cancelled) => {
                info!("[Sync] {}: attempt cancelled during fetch", self.name);
                return;
            }
            Err(e) => {
                warn!("[Sync] {}: fetch failed: {e}", self.name);
                self.persist_status(syncing.failed(e.summary())).await;
                return;
            }
        };

        if self.cancel.is_cancelled() {
            info!("[Sync] {}: attempt cancelled after fetch", self.name);
            return;
        }

        let default_filter = FilterConfig::default();
        let outcome = filter::apply(
            &fetched.registry,
            self.filter.as_ref().unwrap_or(&default_filter),
        );
        let filtered = outcome.registry;
        let count = filtered.len();
        info!(
            "[Sync] {}: fetched {} servers, {} after filtering ({})",
            self.name,
            fetched.registry.len(),
            count,
            fetched.format.as_str()
        );

        // Full-fetch idempotence: identical bytes and filter mean the
        // stored snapshot is already this one.
        if !syncing.last_hash.is_empty()
            && fetched.hash == syncing.last_hash
            && syncing.filter_hash == self.filter_hash
        {
            let status =
                syncing.complete(Utc::now(), fetched.hash, self.filter_hash.clone(), count);
            self.persist_status(status).await;
            return;
        }

        if self.cancel.is_cancelled() {
            info!("[Sync] {}: attempt cancelled before snapshot store", self.name);
            return;
        }
        if let Err(e) = self.store.put(&filtered, &self.cancel).await {
            if self.cancel.is_cancelled() {
                info!("[Sync] {}: attempt cancelled during snapshot store", self.name);
                return;
            }
            error!("[Sync] {}: failed to store snapshot: {e:#}", self.name);
            self.persist_status(syncing.failed(format!("store snapshot: {e:#}")))
                .await;
            return;
        }

        self.service.install_snapshot(Arc::new(filtered));

        let status = syncing.complete(Utc::now(), fetched.hash, self.filter_hash.clone(), count);
        self.persist_status(status).await;
        info!("[Sync] {}: sync complete, {} servers", self.name, count);
    }

    /// Record a Complete/Failed transition. A cancellation observed here
    /// discards the transition entirely, leaving the stored and cached
    /// status at Syncing.
    async fn persist_status(&self, status: SyncStatus) {
        if self.cancel.is_cancelled() {
            info!(
                "[Sync] {}: attempt cancelled before status transition",
                self.name
            );
            return;
        }
        if let Err(e) = self.store.put_status(&status, &self.cancel).await {
            if self.cancel.is_cancelled() {
                info!(
                    "[Sync] {}: attempt cancelled during status transition",
                    self.name
                );
                return;
            }
            error!("[Sync] {}: failed to persist status: {e:#}", self.name);
        }
        self.service.set_status(status);
    }

    /// How long to sleep before the next timer wakeup.
    fn next_delay(&self, decision: &SyncDecision) -> Duration {
        if decision.sync {
            // An attempt just ran. After a failure, wait out the longer
            // of the interval and the retry backoff.
            let failed = self
                .service
                .status()
                .is_some_and(|s| s.phase == mcpmirror_core::sync::SyncPhase::Failed);
            if failed {
                return self.interval.max(self.min_retry_backoff);
            }
            return self.interval;
        }
        match decision.next_check {
            Some(hint) if hint > Duration::ZERO => hint.min(self.interval),
            _ => self.interval,
        }
    }
}

fn no_decision(reason: SyncReason) -> SyncDecision {
    SyncDecision {
        sync: false,
        reason,
        next_check: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpmirror_core::config::FileSourceConfig;
    use mcpmirror_core::source::file::FileSource;
    use mcpmirror_core::sync::SyncPhase;
    use mcpmirror_storage::MemoryStore;
    use std::io::Write;

    const DOC_A: &[u8] =
        br#"{"version":"1.0.0","servers":{"a":{"image":"x:1"}},"remote_servers":{}}"#;
    const DOC_B: &[u8] =
        br#"{"version":"1.0.0","servers":{"a":{"image":"x:1"},"b":{"image":"y:2"}},"remote_servers":{}}"#;

    struct Lane {
        handle: SyncHandle,
        service: Arc<RegistryService>,
        store: Arc<MemoryStore>,
        _file: tempfile::NamedTempFile,
    }

    fn lane_for(contents: &[u8], filter: Option<FilterConfig>) -> Lane {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();

        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(RegistryService::new(
            "default",
            false,
            false,
            store.clone(),
        ));
        let handler = Box::new(FileSource::new(
            FileSourceConfig {
                path: file.path().to_string_lossy().into_owned(),
            },
            None,
        ));
        let handle = SyncCoordinator::spawn(
            "default".to_string(),
            service.clone(),
            store.clone(),
            handler,
            filter,
            Duration::from_secs(1800),
            Duration::from_secs(300),
            CancellationToken::new(),
        );
        Lane {
            handle,
            service,
            store,
            _file: file,
        }
    }

    async fn wait_for_phase(service: &RegistryService, phase: SyncPhase) {
        for _ in 0..200 {
            if service.status().is_some_and(|s| s.phase == phase) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("registry never reached {phase:?}");
    }

    #[tokio::test]
    async fn test_first_sync_installs_snapshot() {
        let lane = lane_for(DOC_A, None);
        wait_for_phase(&lane.service, SyncPhase::Complete).await;

        let (snapshot, _) = lane.service.snapshot().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.servers[0].name, "a");

        let status = lane.service.status().unwrap();
        assert_eq!(status.server_count, 1);
        assert_eq!(status.attempt_count, 0);
        assert!(!status.last_hash.is_empty());

        // Store and snapshot agree.
        let stored = lane.store.get().await.unwrap().unwrap();
        assert_eq!(stored, *snapshot);
        lane.handle.shutdown();
    }

    #[tokio::test]
    async fn test_manual_trigger_without_changes_is_coalesced() {
        let lane = lane_for(DOC_A, None);
        wait_for_phase(&lane.service, SyncPhase::Complete).await;

        let decision = lane.handle.trigger().await;
        assert!(!decision.sync);
        assert_eq!(decision.reason, SyncReason::ManualNoChanges);
        lane.handle.shutdown();
    }

    #[tokio::test]
    async fn test_source_change_detected_on_trigger() {
        let lane = lane_for(DOC_A, None);
        wait_for_phase(&lane.service, SyncPhase::Complete).await;
        let first_hash = lane.service.status().unwrap().last_hash.clone();

        std::fs::write(lane._file.path(), DOC_B).unwrap();
        let decision = lane.handle.trigger().await;
        assert!(decision.sync);
        assert_eq!(decision.reason, SyncReason::SourceDataChanged);

        let status = lane.service.status().unwrap();
        assert_eq!(status.server_count, 2);
        assert_ne!(status.last_hash, first_hash);
        lane.handle.shutdown();
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_snapshot() {
        let lane = lane_for(DOC_A, None);
        wait_for_phase(&lane.service, SyncPhase::Complete).await;

        // Replace the file with garbage; the next attempt must fail but
        // keep serving the old snapshot.
        std::fs::write(lane._file.path(), b"not json at all").unwrap();
        let decision = lane.handle.trigger().await;
        assert!(decision.sync);
        wait_for_phase(&lane.service, SyncPhase::Failed).await;

        let (snapshot, _) = lane.service.snapshot().unwrap();
        assert_eq!(snapshot.len(), 1);
        let status = lane.service.status().unwrap();
        assert_eq!(status.attempt_count, 1);
        assert!(!status.message.is_empty());
        lane.handle.shutdown();
    }

    #[tokio::test]
    async fn test_filter_applied_before_store() {
        let filter = FilterConfig {
            names: mcpmirror_core::config::FilterRules {
                include: vec!["a".to_string()],
                exclude: vec![],
            },
            tags: Default::default(),
        };
        let lane = lane_for(DOC_B, Some(filter));
        wait_for_phase(&lane.service, SyncPhase::Complete).await;

        let (snapshot, _) = lane.service.snapshot().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.servers[0].name, "a");
        let stored = lane.store.get().await.unwrap().unwrap();
        assert_eq!(stored.len(), 1);
        lane.handle.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_stops_lane() {
        let lane = lane_for(DOC_A, None);
        wait_for_phase(&lane.service, SyncPhase::Complete).await;
        lane.handle.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;
        // A trigger against a stopped lane reports AlreadyInProgress
        // rather than hanging.
        let decision = lane.handle.trigger().await;
        assert!(!decision.sync);
    }
}
