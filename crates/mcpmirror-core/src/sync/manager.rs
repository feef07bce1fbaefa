//! The sync decision function.
//!
//! Pure: the coordinator gathers the inputs (stored status, cheap source
//! hash, current filter hash, clock) and this module answers whether an
//! attempt should run, with a machine-readable reason. Rules are matched
//! strictly in order; the first hit wins.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::status::{SyncPhase, SyncStatus};

/// Default minimum gap between attempts after a failure. Interval-driven
/// recovery still applies; this only prevents tight retry loops.
pub const DEFAULT_MIN_RETRY_BACKOFF: Duration = Duration::from_secs(5 * 60);

/// Why a sync will or will not run.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum SyncReason {
    AlreadyInProgress,
    RegistryNotReady,
    FilterChanged,
    SourceDataChanged,
    ManualWithChanges,
    ManualNoChanges,
    IntervalElapsed,
    RequeueTimeNotElapsed,
    UpToDate,
}

/// Decision plus a hint for when to look again.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SyncDecision {
    pub sync: bool,
    pub reason: SyncReason,
    /// Suggested wait before the next check, when one is meaningful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_check: Option<Duration>,
}

impl SyncDecision {
    fn yes(reason: SyncReason) -> Self {
        Self {
            sync: true,
            reason,
            next_check: None,
        }
    }

    fn no(reason: SyncReason, next_check: Option<Duration>) -> Self {
        Self {
            sync: false,
            reason,
            next_check,
        }
    }
}

/// Inputs to one decision.
#[derive(Debug)]
pub struct SyncContext<'a> {
    /// Persisted status from the previous attempt, if any.
    pub status: Option<&'a SyncStatus>,
    /// Cheap current hash of the source, when the handler could compute
    /// one without a full fetch.
    pub source_hash: Option<&'a str>,
    /// Hash of the filter rules currently in force.
    pub filter_hash: &'a str,
    /// True while another attempt holds the registry's sync slot.
    pub in_flight: bool,
    /// True when this wakeup came from a manual trigger.
    pub manual: bool,
    pub now: DateTime<Utc>,
    pub interval: Duration,
    pub min_retry_backoff: Duration,
}

/// Evaluate the decision table.
pub fn should_sync(ctx: &SyncContext<'_>) -> SyncDecision {
    if ctx.in_flight {
        return SyncDecision::no(SyncReason::AlreadyInProgress, None);
    }

    let status = match ctx.status {
        Some(s) => s,
        // Nothing persisted yet: first ever attempt.
        None => return SyncDecision::yes(SyncReason::RegistryNotReady),
    };

    if status.last_success.is_none() || status.phase == SyncPhase::Failed {
        return SyncDecision::yes(SyncReason::RegistryNotReady);
    }

    let filter_changed = status.filter_hash != ctx.filter_hash;
    if filter_changed {
        return SyncDecision::yes(SyncReason::FilterChanged);
    }

    let source_changed = ctx
        .source_hash
        .is_some_and(|hash| !status.last_hash.is_empty() && status.last_hash != hash);
    if source_changed {
        return SyncDecision::yes(SyncReason::SourceDataChanged);
    }

    if ctx.manual {
        // Reaching this row means neither hash moved.
        if source_changed || filter_changed {
            return SyncDecision::yes(SyncReason::ManualWithChanges);
        }
        return SyncDecision::no(SyncReason::ManualNoChanges, None);
    }

    if let Some(last_success) = status.last_success {
        let elapsed = (ctx.now - last_success)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if elapsed >= ctx.interval {
            return SyncDecision::yes(SyncReason::IntervalElapsed);
        }
    }

    let since_attempt = (ctx.now - status.last_attempt)
        .to_std()
        .unwrap_or(Duration::ZERO);
    if since_attempt < ctx.min_retry_backoff {
        return SyncDecision::no(
            SyncReason::RequeueTimeNotElapsed,
            Some(ctx.min_retry_backoff - since_attempt),
        );
    }

    let next = ctx
        .status
        .and_then(|s| s.last_success)
        .map(|t| {
            let elapsed = (ctx.now - t).to_std().unwrap_or(Duration::ZERO);
            ctx.interval.saturating_sub(elapsed)
        });
    SyncDecision::no(SyncReason::UpToDate, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    const INTERVAL: Duration = Duration::from_secs(1800);
    const BACKOFF: Duration = Duration::from_secs(300);

    fn complete_status(now: DateTime<Utc>, age: Duration) -> SyncStatus {
        let then = now - TimeDelta::from_std(age).unwrap();
        SyncStatus {
            phase: SyncPhase::Complete,
            last_attempt: then,
            last_success: Some(then),
            attempt_count: 0,
            last_hash: "h1".to_string(),
            server_count: 2,
            message: String::new(),
            filter_hash: "f1".to_string(),
        }
    }

    fn ctx<'a>(
        status: Option<&'a SyncStatus>,
        source_hash: Option<&'a str>,
        now: DateTime<Utc>,
    ) -> SyncContext<'a> {
        SyncContext {
            status,
            source_hash,
            filter_hash: "f1",
            in_flight: false,
            manual: false,
            now,
            interval: INTERVAL,
            min_retry_backoff: BACKOFF,
        }
    }

    #[test]
    fn test_in_flight_wins_over_everything() {
        let now = Utc::now();
        let mut c = ctx(None, None, now);
        c.in_flight = true;
        c.manual = true;
        let decision = should_sync(&c);
        assert!(!decision.sync);
        assert_eq!(decision.reason, SyncReason::AlreadyInProgress);
    }

    #[test]
    fn test_no_status_means_not_ready() {
        let decision = should_sync(&ctx(None, None, Utc::now()));
        assert!(decision.sync);
        assert_eq!(decision.reason, SyncReason::RegistryNotReady);
    }

    #[test]
    fn test_failed_phase_means_not_ready() {
        let now = Utc::now();
        let status = complete_status(now, Duration::from_secs(60)).failed("x".to_string());
        let decision = should_sync(&ctx(Some(&status), None, now));
        assert!(decision.sync);
        assert_eq!(decision.reason, SyncReason::RegistryNotReady);
    }

    #[test]
    fn test_filter_change_triggers_sync() {
        let now = Utc::now();
        let status = complete_status(now, Duration::from_secs(60));
        let mut c = ctx(Some(&status), None, now);
        c.filter_hash = "f2";
        let decision = should_sync(&c);
        assert!(decision.sync);
        assert_eq!(decision.reason, SyncReason::FilterChanged);
    }

    #[test]
    fn test_source_change_triggers_sync() {
        let now = Utc::now();
        let status = complete_status(now, Duration::from_secs(60));
        let decision = should_sync(&ctx(Some(&status), Some("h2"), now));
        assert!(decision.sync);
        assert_eq!(decision.reason, SyncReason::SourceDataChanged);
    }

    #[test]
    fn test_manual_without_changes_is_coalesced() {
        let now = Utc::now();
        let status = complete_status(now, Duration::from_secs(60));
        let mut c = ctx(Some(&status), Some("h1"), now);
        c.manual = true;
        let decision = should_sync(&c);
        assert!(!decision.sync);
        assert_eq!(decision.reason, SyncReason::ManualNoChanges);
    }

    #[test]
    fn test_interval_elapsed() {
        let now = Utc::now();
        let status = complete_status(now, INTERVAL + Duration::from_secs(1));
        let decision = should_sync(&ctx(Some(&status), Some("h1"), now));
        assert!(decision.sync);
        assert_eq!(decision.reason, SyncReason::IntervalElapsed);
    }

    #[test]
    fn test_recent_attempt_requeues() {
        let now = Utc::now();
        // Success long ago but a fresh attempt just ran: the next check is
        // pushed past the backoff window. Interval has not elapsed here.
        let mut status = complete_status(now, Duration::from_secs(60));
        status.last_attempt = now - TimeDelta::seconds(10);
        let decision = should_sync(&ctx(Some(&status), Some("h1"), now));
        assert!(!decision.sync);
        assert_eq!(decision.reason, SyncReason::RequeueTimeNotElapsed);
        assert!(decision.next_check.unwrap() <= BACKOFF);
    }

    #[test]
    fn test_up_to_date_with_next_check_hint() {
        let now = Utc::now();
        let status = complete_status(now, Duration::from_secs(600));
        let decision = should_sync(&ctx(Some(&status), Some("h1"), now));
        assert!(!decision.sync);
        assert_eq!(decision.reason, SyncReason::UpToDate);
        let hint = decision.next_check.unwrap();
        assert!(hint <= INTERVAL - Duration::from_secs(599));
        assert!(hint >= Duration::from_secs(1));
    }

    #[test]
    fn test_unknown_source_hash_does_not_trigger() {
        let now = Utc::now();
        let status = complete_status(now, Duration::from_secs(60));
        let decision = should_sync(&ctx(Some(&status), None, now));
        assert!(!decision.sync);
    }
}
