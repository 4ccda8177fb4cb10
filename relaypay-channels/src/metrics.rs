//! Counters for channel activity.
//!
//! Subscription handling never surfaces rejected packages to the callback,
//! so these counters (together with [`ChannelEvent`](crate::ChannelEvent))
//! are how an operator notices a corrupted or stalled feed.
//!
//! # Example
//!
//! ```rust
//! use relaypay_channels::ChannelMetrics;
//!
//! let metrics = ChannelMetrics::new();
//! metrics.record_package_received();
//! metrics.record_invalid_signature();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.packages_received, 1);
//! assert_eq!(snapshot.total_rejections(), 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Channel counters, shared by every controller of a manager.
///
/// Thread-safe via atomic operations.
#[derive(Debug)]
pub struct ChannelMetrics {
    // Outgoing writes
    states_written: AtomicU64,
    write_failures: AtomicU64,

    // Subscription decisions
    packages_received: AtomicU64,
    packages_accepted: AtomicU64,
    stale_packages: AtomicU64,
    echoed_writes: AtomicU64,
    invalid_signatures: AtomicU64,
    malformed_packages: AtomicU64,

    // Settlement
    settlements_attempted: AtomicU64,
    settlements_succeeded: AtomicU64,
    settlements_failed: AtomicU64,

    start_time: Instant,
}

impl Default for ChannelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            states_written: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            packages_received: AtomicU64::new(0),
            packages_accepted: AtomicU64::new(0),
            stale_packages: AtomicU64::new(0),
            echoed_writes: AtomicU64::new(0),
            invalid_signatures: AtomicU64::new(0),
            malformed_packages: AtomicU64::new(0),
            settlements_attempted: AtomicU64::new(0),
            settlements_succeeded: AtomicU64::new(0),
            settlements_failed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a signed state written to the store.
    pub fn record_state_written(&self) {
        self.states_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed or timed-out store write.
    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a value delivered by a subscription.
    pub fn record_package_received(&self) {
        self.packages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_package_accepted(&self) {
        self.packages_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_package(&self) {
        self.stale_packages.fetch_add(1, Ordering::Relaxed);
    }

    /// Record this party's own write delivered back by its subscription.
    pub fn record_echoed_write(&self) {
        self.echoed_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a package rejected by signature checks, including packages
    /// without a public key or from an untrusted signer.
    pub fn record_invalid_signature(&self) {
        self.invalid_signatures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed_package(&self) {
        self.malformed_packages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_settlement_attempt(&self) {
        self.settlements_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_settlement_success(&self) {
        self.settlements_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_settlement_failure(&self) {
        self.settlements_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            states_written: self.states_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            packages_received: self.packages_received.load(Ordering::Relaxed),
            packages_accepted: self.packages_accepted.load(Ordering::Relaxed),
            stale_packages: self.stale_packages.load(Ordering::Relaxed),
            echoed_writes: self.echoed_writes.load(Ordering::Relaxed),
            invalid_signatures: self.invalid_signatures.load(Ordering::Relaxed),
            malformed_packages: self.malformed_packages.load(Ordering::Relaxed),
            settlements_attempted: self.settlements_attempted.load(Ordering::Relaxed),
            settlements_succeeded: self.settlements_succeeded.load(Ordering::Relaxed),
            settlements_failed: self.settlements_failed.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of [`ChannelMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Seconds since the collector was created.
    pub uptime_secs: u64,

    pub states_written: u64,
    pub write_failures: u64,

    pub packages_received: u64,
    pub packages_accepted: u64,
    pub stale_packages: u64,
    /// Own writes seen again on the subscription; neither accepted nor stale.
    pub echoed_writes: u64,
    pub invalid_signatures: u64,
    pub malformed_packages: u64,

    pub settlements_attempted: u64,
    pub settlements_succeeded: u64,
    pub settlements_failed: u64,
}

impl MetricsSnapshot {
    /// Packages that reached the subscriber callback, as a fraction of all
    /// received apart from echoed own writes (1.0 when there were none).
    pub fn acceptance_rate(&self) -> f64 {
        let considered = self.packages_received.saturating_sub(self.echoed_writes);
        if considered == 0 {
            return 1.0;
        }
        self.packages_accepted as f64 / considered as f64
    }

    /// Packages dropped for a reason other than staleness.
    pub fn total_rejections(&self) -> u64 {
        self.invalid_signatures + self.malformed_packages
    }

    /// Format as JSON for logging.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}
