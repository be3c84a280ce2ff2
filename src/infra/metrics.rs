//! Lock-free monitor counters and periodic reporting
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are
//! statistical counters only; never branch on them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Counters shared between the session loop and its in-flight tasks
pub struct MonitorMetrics {
    started_at: Instant,
    fixes_accepted: AtomicU64,
    fixes_stale: AtomicU64,
    location_errors: AtomicU64,
    boundary_exits: AtomicU64,
    alerts_sent: AtomicU64,
    alerts_failed: AtomicU64,
    polls_ok: AtomicU64,
    polls_failed: AtomicU64,
    anomalies: AtomicU64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSummary {
    pub uptime_secs: u64,
    pub fixes_accepted: u64,
    pub fixes_stale: u64,
    pub location_errors: u64,
    pub boundary_exits: u64,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
    pub polls_ok: u64,
    pub polls_failed: u64,
    pub anomalies: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            uptime_secs = %self.uptime_secs,
            fixes_accepted = %self.fixes_accepted,
            fixes_stale = %self.fixes_stale,
            location_errors = %self.location_errors,
            boundary_exits = %self.boundary_exits,
            alerts_sent = %self.alerts_sent,
            alerts_failed = %self.alerts_failed,
            polls_ok = %self.polls_ok,
            polls_failed = %self.polls_failed,
            anomalies = %self.anomalies,
            "monitor_metrics"
        );
    }
}

impl MonitorMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            fixes_accepted: AtomicU64::new(0),
            fixes_stale: AtomicU64::new(0),
            location_errors: AtomicU64::new(0),
            boundary_exits: AtomicU64::new(0),
            alerts_sent: AtomicU64::new(0),
            alerts_failed: AtomicU64::new(0),
            polls_ok: AtomicU64::new(0),
            polls_failed: AtomicU64::new(0),
            anomalies: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_fix_accepted(&self) {
        self.fixes_accepted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fix_stale(&self) {
        self.fixes_stale.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_location_error(&self) {
        self.location_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_boundary_exit(&self) {
        self.boundary_exits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record per-recipient delivery counts of one dispatch
    pub fn record_dispatch(&self, sent: u64, failed: u64) {
        self.alerts_sent.fetch_add(sent, Ordering::Relaxed);
        self.alerts_failed.fetch_add(failed, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_poll(&self, ok: bool) {
        if ok {
            self.polls_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.polls_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_anomaly(&self) {
        self.anomalies.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot without resetting; these are lifetime totals for one session
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            uptime_secs: self.started_at.elapsed().as_secs(),
            fixes_accepted: self.fixes_accepted.load(Ordering::Relaxed),
            fixes_stale: self.fixes_stale.load(Ordering::Relaxed),
            location_errors: self.location_errors.load(Ordering::Relaxed),
            boundary_exits: self.boundary_exits.load(Ordering::Relaxed),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
            alerts_failed: self.alerts_failed.load(Ordering::Relaxed),
            polls_ok: self.polls_ok.load(Ordering::Relaxed),
            polls_failed: self.polls_failed.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
        }
    }
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}
