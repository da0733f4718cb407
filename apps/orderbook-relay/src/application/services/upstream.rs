//! Upstream fetch health tracking.
//!
//! Only venue and relay faults feed the failure streak that drives
//! readiness. A rejected request, such as a client subscribing to a symbol
//! the venue does not list, is counted separately and leaves the streak
//! untouched.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::ports::MarketDataError;

/// Tracks the outcome of snapshot fetches across all pumps.
#[derive(Debug, Default)]
pub struct UpstreamState {
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
    consecutive_failures: AtomicU64,
    last_success_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
    last_error: parking_lot::RwLock<Option<String>>,
}

impl UpstreamState {
    /// Create a fresh tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful fetch.
    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        *self.last_success_at.write() = Some(Utc::now());
    }

    /// Record a failed fetch.
    pub fn record_failure(&self, error: &MarketDataError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        if error.is_request_fault() {
            self.rejections.fetch_add(1, Ordering::Relaxed);
        } else {
            self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        }
        *self.last_error.write() = Some(error.to_string());
    }

    /// Failures since the last success.
    #[must_use]
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Point-in-time view for status reporting.
    #[must_use]
    pub fn status(&self) -> UpstreamStatus {
        UpstreamStatus {
            fetch_successes: self.successes.load(Ordering::Relaxed),
            fetch_failures: self.failures.load(Ordering::Relaxed),
            fetch_rejections: self.rejections.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures(),
            last_success_at: *self.last_success_at.read(),
            last_error: self.last_error.read().clone(),
        }
    }
}

/// Serializable upstream status.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamStatus {
    /// Total successful fetches.
    pub fetch_successes: u64,
    /// Total failed fetches, rejections included.
    pub fetch_failures: u64,
    /// Failed fetches the venue rejected as invalid requests.
    pub fetch_rejections: u64,
    /// Venue or relay faults since the last success.
    pub consecutive_failures: u64,
    /// Time of the last successful fetch.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Most recent fetch error.
    pub last_error: Option<String>,
}
