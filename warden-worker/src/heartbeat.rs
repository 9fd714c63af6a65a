//! Liveness tracking
//!
//! The scheduler records a beat after every successful cycle; status queries
//! read it from other tasks without locking.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use warden_ipc::HeartbeatInfo;

const NEVER: i64 = i64::MIN;

/// Timestamp of the last successful cycle
#[derive(Debug)]
pub struct HeartbeatTracker {
    started_at: DateTime<Utc>,
    last_success_ms: AtomicI64,
    health_timeout: Duration,
}

impl HeartbeatTracker {
    pub fn new(health_timeout: Duration) -> Self {
        Self::started_at(Utc::now(), health_timeout)
    }

    /// Tracker for a service that started at `started_at`
    pub fn started_at(started_at: DateTime<Utc>, health_timeout: Duration) -> Self {
        Self {
            started_at,
            last_success_ms: AtomicI64::new(NEVER),
            health_timeout,
        }
    }

    /// Record a successful cycle now
    pub fn beat(&self) {
        self.beat_at(Utc::now());
    }

    /// Record a successful cycle at `at`. Beats never move backwards.
    pub fn beat_at(&self, at: DateTime<Utc>) {
        self.last_success_ms
            .fetch_max(at.timestamp_millis(), Ordering::AcqRel);
    }

    /// Time of the last successful cycle, if any
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        match self.last_success_ms.load(Ordering::Acquire) {
            NEVER => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }

    pub fn service_start_time(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn health_timeout(&self) -> Duration {
        self.health_timeout
    }

    /// Healthy while the last beat is younger than the health timeout. Before
    /// the first beat, the service start time stands in for it.
    pub fn is_healthy(&self) -> bool {
        self.is_healthy_at(Utc::now())
    }

    pub fn is_healthy_at(&self, now: DateTime<Utc>) -> bool {
        let reference = self.last_success().unwrap_or(self.started_at);
        match (now - reference).to_std() {
            Ok(age) => age < self.health_timeout,
            // Reference is in the future: clock stepped back
            Err(_) => true,
        }
    }

    /// Snapshot for a heartbeat reply
    pub fn info(&self) -> HeartbeatInfo {
        let now = Utc::now();
        HeartbeatInfo {
            last_success: self.last_success(),
            is_healthy: self.is_healthy_at(now),
            checked_at: now,
        }
    }
}
