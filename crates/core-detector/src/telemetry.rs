//! Detection telemetry.
//!
//! Process-wide relaxed counters, no locking. Tests read them through
//! `snapshot()` and compare deltas since other tests run concurrently.
use std::sync::atomic::{AtomicU64, Ordering};

pub static ATTEMPTS_STARTED: AtomicU64 = AtomicU64::new(0);
pub static ATTEMPTS_SUCCEEDED: AtomicU64 = AtomicU64::new(0);
pub static ATTEMPTS_FAILED: AtomicU64 = AtomicU64::new(0);
pub static NATIVE_QUERIES: AtomicU64 = AtomicU64::new(0);
pub static NATIVE_QUERY_REJECTIONS: AtomicU64 = AtomicU64::new(0);
pub static REFLOW_SIGNALS: AtomicU64 = AtomicU64::new(0);
pub static FALLBACK_BUG_SUPPRESSIONS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetrySnapshot {
    pub attempts_started: u64,
    pub attempts_succeeded: u64,
    pub attempts_failed: u64,
    pub native_queries: u64,
    pub native_query_rejections: u64,
    pub reflow_signals: u64,
    pub fallback_bug_suppressions: u64,
}

pub(crate) fn incr(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::Relaxed) + 1
}

pub fn snapshot() -> TelemetrySnapshot {
    TelemetrySnapshot {
        attempts_started: ATTEMPTS_STARTED.load(Ordering::Relaxed),
        attempts_succeeded: ATTEMPTS_SUCCEEDED.load(Ordering::Relaxed),
        attempts_failed: ATTEMPTS_FAILED.load(Ordering::Relaxed),
        native_queries: NATIVE_QUERIES.load(Ordering::Relaxed),
        native_query_rejections: NATIVE_QUERY_REJECTIONS.load(Ordering::Relaxed),
        reflow_signals: REFLOW_SIGNALS.load(Ordering::Relaxed),
        fallback_bug_suppressions: FALLBACK_BUG_SUPPRESSIONS.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incr_returns_new_value() {
        let counter = AtomicU64::new(41);
        assert_eq!(incr(&counter), 42);
        assert_eq!(counter.load(Ordering::Relaxed), 42);
    }

    #[test]
    fn snapshot_is_monotonic() {
        let before = snapshot();
        incr(&REFLOW_SIGNALS);
        let after = snapshot();
        assert!(after.reflow_signals > before.reflow_signals);
    }
}
